//! Moving the rotation between tabs

use chrono::Utc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use super::Engine;
use crate::{
    host::Tab,
    state::{RotationState, TabId},
};

/// Grace period before a freshly activated tab is checked for a load failure
pub const ERROR_CHECK_DELAY: Duration = Duration::from_secs(2);
/// Title fragments of pages that failed to load
pub const ERROR_TITLE_SIGNATURES: &[&str] = &["not found", "Error", "timed out"];
/// Badge background while running
pub const BADGE_COLOR: &str = "#4CAF50";
/// Upper bound on retries after the target tab vanished mid-navigation
const MAX_NAVIGATION_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
    /// Re-show the current tab, used when a rotation starts
    Current,
}

/// Result of one `navigate` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigateOutcome {
    Navigated { tab_id: TabId, index: usize, total: usize },
    /// Nothing eligible to show
    NoTabs,
    /// Another navigation held the slot; this call was dropped
    Busy,
    /// The host could not complete the switch
    Failed,
}

/// Tabs taking part in rotation, in window order
pub fn active_tabs(tabs: &[Tab], state: &RotationState) -> Vec<Tab> {
    tabs.iter()
        .filter(|tab| state.is_included(tab.id))
        .cloned()
        .collect()
}

/// Index after one step in `direction` over `len` tabs. An index left out
/// of range by a shrunken tab set is first clamped to 0.
pub fn step_index(current: usize, len: usize, direction: Direction) -> usize {
    if len == 0 {
        return 0;
    }
    let current = if current >= len { 0 } else { current };
    match direction {
        Direction::Next => (current + 1) % len,
        Direction::Previous => (current + len - 1) % len,
        Direction::Current => current,
    }
}

/// Whether a tab title looks like a failed page load
pub fn is_error_title(title: &str) -> bool {
    ERROR_TITLE_SIGNATURES
        .iter()
        .any(|signature| title.contains(signature))
}

impl Engine {
    /// Move the rotation one step.
    ///
    /// At most one navigation runs at a time; a call arriving while another
    /// is in flight is dropped, not queued.
    pub async fn navigate(&self, direction: Direction) -> NavigateOutcome {
        let Some(_slot) = self.state().try_begin_navigation() else {
            info!("Navigation already in progress, dropping {:?}", direction);
            return NavigateOutcome::Busy;
        };

        let outcome = self.navigate_locked(direction).await;
        self.store().save(self.state()).await;
        outcome
    }

    async fn navigate_locked(&self, mut direction: Direction) -> NavigateOutcome {
        for _ in 0..MAX_NAVIGATION_ATTEMPTS {
            let tabs = match self.tabs().query_tabs().await {
                Ok(tabs) => tabs,
                Err(e) => {
                    warn!("Could not enumerate tabs: {}", e);
                    return NavigateOutcome::Failed;
                }
            };
            let active = self.state().read(|s| active_tabs(&tabs, s));
            if active.is_empty() {
                warn!("No active tabs available for rotation");
                return NavigateOutcome::NoTabs;
            }

            let total = active.len();
            let index = self.state().update(|s| {
                s.current_index = step_index(s.current_index, total, direction);
                s.current_index
            });
            let target = &active[index];

            // The tab may have closed since enumeration; a running rotation
            // restarts from the top and rotates on
            if let Err(e) = self.tabs().get_tab(target.id).await {
                warn!("Tab {} no longer exists: {}", target.id, e);
                self.state().update(|s| s.current_index = 0);
                if self.state().read(|s| s.status.is_running()) {
                    direction = Direction::Next;
                    continue;
                }
                return NavigateOutcome::Failed;
            }

            if let Err(e) = self.tabs().activate(target.id).await {
                warn!("Error activating tab {}: {}", target.id, e);
                return NavigateOutcome::Failed;
            }
            debug!("Activated tab {} ({}/{})", target.id, index + 1, total);

            if self.state().read(|s| s.status.is_running()) {
                let badge = format!("{}/{}", index + 1, total);
                if let Err(e) = self.action().set_badge(&badge, Some(BADGE_COLOR)).await {
                    warn!("Failed to update badge: {}", e);
                }
            }

            self.spawn_error_page_check(target.id);

            let overlay_enabled = self.state().read(|s| s.global_config.overlay_enabled);
            self.overlay().ensure(target.id, overlay_enabled).await;

            self.prefetch_next(&active, index).await;
            self.ensure_fullscreen().await;

            // Pause or Start may have landed during the awaits above
            if self.state().read(|s| s.status.is_running()) {
                let interval = self.state().read(|s| s.effective_interval(target.id));
                self.scheduler().arm(self.state(), interval).await;
            }

            return NavigateOutcome::Navigated {
                tab_id: target.id,
                index,
                total,
            };
        }

        warn!("Gave up navigating after {} vanished tabs", MAX_NAVIGATION_ATTEMPTS);
        NavigateOutcome::Failed
    }

    /// Rotate to the next tab if the rotation is running
    pub async fn rotate(&self) -> NavigateOutcome {
        if !self.state().read(|s| s.status.is_running()) {
            return NavigateOutcome::Failed;
        }
        self.navigate(Direction::Next).await
    }

    /// Reload the tab after `index` ahead of time when it asks for it
    async fn prefetch_next(&self, active: &[Tab], index: usize) {
        let next = &active[(index + 1) % active.len()];
        if next.id == active[index].id || !self.state().read(|s| s.wants_refresh(next.id)) {
            return;
        }

        let now = Utc::now();
        if !self.state().refresh_registry().is_due(next.id, now) {
            debug!("Tab {} refreshed recently, skipping", next.id);
            return;
        }
        match self.tabs().reload(next.id).await {
            Ok(()) => {
                self.state().refresh_registry().stamp(next.id, now);
                debug!("Prefetched tab {}", next.id);
            }
            Err(e) => warn!("Error refreshing tab {}: {}", next.id, e),
        }
    }

    async fn ensure_fullscreen(&self) {
        if !self.state().read(|s| s.global_config.fullscreen_enabled) {
            return;
        }
        match self.tabs().is_fullscreen().await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.tabs().request_fullscreen().await {
                    warn!("Error setting fullscreen: {}", e);
                }
            }
            Err(e) => warn!("Error reading window state: {}", e),
        }
    }

    /// Best-effort recovery from pages that failed to load: look at the
    /// title after a grace period and move on if it reads like an error.
    fn spawn_error_page_check(&self, tab_id: TabId) {
        let engine = self.clone();
        tokio::spawn(async move {
            sleep(ERROR_CHECK_DELAY).await;
            let tab = match engine.tabs().get_tab(tab_id).await {
                Ok(tab) => tab,
                Err(e) => {
                    debug!("Error checking tab status: {}", e);
                    return;
                }
            };
            if is_error_title(&tab.title) && engine.state().read(|s| s.status.is_running()) {
                warn!("Tab {} failed to load ({:?}), rotating past it", tab_id, tab.title);
                engine.rotate().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TabConfig;

    fn tabs(ids: &[TabId]) -> Vec<Tab> {
        ids.iter()
            .map(|&id| Tab { id, title: String::new(), url: String::new(), active: false })
            .collect()
    }

    #[test]
    fn next_cycles_back_to_start() {
        for len in 1..6 {
            for start in 0..len {
                let mut index = start;
                for _ in 0..len {
                    index = step_index(index, len, Direction::Next);
                }
                assert_eq!(index, start, "len={len} start={start}");
            }
        }
    }

    #[test]
    fn previous_inverts_next() {
        for len in 1..6 {
            for start in 0..len {
                let forward = step_index(start, len, Direction::Next);
                assert_eq!(step_index(forward, len, Direction::Previous), start);
            }
        }
        assert_eq!(step_index(0, 3, Direction::Previous), 2);
    }

    #[test]
    fn stale_index_is_clamped_before_stepping() {
        assert_eq!(step_index(4, 2, Direction::Current), 0);
        assert_eq!(step_index(4, 2, Direction::Next), 1);
        assert_eq!(step_index(2, 2, Direction::Previous), 1);
        assert_eq!(step_index(7, 0, Direction::Next), 0);
    }

    #[test]
    fn excluded_tabs_leave_the_rotation() {
        let mut state = RotationState::default();
        state.tabs_config.insert(2, TabConfig { included: false, ..TabConfig::default() });
        let ids: Vec<TabId> = active_tabs(&tabs(&[1, 2, 3]), &state).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn error_titles_are_recognised() {
        assert!(is_error_title("404 not found"));
        assert!(is_error_title("Error loading page"));
        assert!(is_error_title("Connection timed out"));
        assert!(!is_error_title("Sales dashboard"));
    }
}
