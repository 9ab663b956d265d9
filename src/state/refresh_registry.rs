//! Ephemeral record of background reloads, used to throttle refresh-before

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::TabId;

/// A tab is reloaded at most once per this window
pub const REFRESH_THROTTLE_SECS: i64 = 30;

/// Last background reload per tab. Never persisted; a restart simply allows
/// one redundant reload.
#[derive(Debug, Default, Clone)]
pub struct RefreshRegistry {
    last_refresh: HashMap<TabId, DateTime<Utc>>,
}

impl RefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the throttle window for `tab_id` has passed
    pub fn is_due(&self, tab_id: TabId, now: DateTime<Utc>) -> bool {
        match self.last_refresh.get(&tab_id) {
            Some(last) => now - *last > Duration::seconds(REFRESH_THROTTLE_SECS),
            None => true,
        }
    }

    pub fn stamp(&mut self, tab_id: TabId, now: DateTime<Utc>) {
        self.last_refresh.insert(tab_id, now);
    }

    pub fn forget(&mut self, tab_id: TabId) {
        self.last_refresh.remove(&tab_id);
    }

    pub fn last_refresh(&self, tab_id: TabId) -> Option<DateTime<Utc>> {
        self.last_refresh.get(&tab_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_check_inside_window_is_throttled() {
        let mut registry = RefreshRegistry::new();
        let t0 = Utc::now();

        assert!(registry.is_due(3, t0));
        registry.stamp(3, t0);
        assert!(!registry.is_due(3, t0 + Duration::seconds(10)));
        assert!(!registry.is_due(3, t0 + Duration::seconds(30)));
        assert!(registry.is_due(3, t0 + Duration::seconds(31)));
        assert!(registry.is_due(4, t0));
    }

    #[test]
    fn forgotten_tab_is_due_again() {
        let mut registry = RefreshRegistry::new();
        let t0 = Utc::now();
        registry.stamp(9, t0);
        registry.forget(9);
        assert!(registry.is_due(9, t0));
        assert!(registry.last_refresh(9).is_none());
    }
}
