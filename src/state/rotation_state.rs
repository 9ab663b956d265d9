//! Persisted rotation record and its configuration types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host-assigned tab identifier
pub type TabId = u32;

/// Shortest and longest dwell accepted for any tab, in seconds
pub const MIN_INTERVAL_SECS: u64 = 1;
pub const MAX_INTERVAL_SECS: u64 = 3600;

/// Rotation status as persisted and reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl Status {
    pub fn is_running(self) -> bool {
        self == Status::Running
    }

    /// Icon tint that signals this status
    pub fn icon_color(self) -> IconColor {
        match self {
            Status::Running => IconColor::Green,
            Status::Paused => IconColor::Yellow,
            Status::Stopped => IconColor::Red,
        }
    }
}

/// Toolbar icon tint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconColor {
    Green,
    Yellow,
    Red,
}

impl IconColor {
    pub fn hex(self) -> &'static str {
        match self {
            IconColor::Green => "#4CAF50",
            IconColor::Yellow => "#FFC107",
            IconColor::Red => "#F44336",
        }
    }
}

/// Per-tab overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabConfig {
    /// Dwell override in seconds; `None` or 0 falls back to the global default
    pub interval: Option<u64>,
    /// Reload the tab shortly before it becomes current
    pub refresh_before: bool,
    /// Membership in the rotation
    pub included: bool,
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            interval: None,
            refresh_before: false,
            included: true,
        }
    }
}

/// Settings shared by every tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalConfig {
    pub default_interval: u64,
    pub fullscreen_enabled: bool,
    pub overlay_enabled: bool,
    pub auto_start: bool,
    pub idle_pause_enabled: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_interval: 10,
            fullscreen_enabled: false,
            overlay_enabled: true,
            auto_start: false,
            idle_pause_enabled: false,
        }
    }
}

/// Rejected configuration update
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("interval must be between 1 and 3600 seconds, got {0}")]
    DefaultInterval(u64),
    #[error("invalid interval {interval} for tab {tab_id}")]
    TabInterval { tab_id: TabId, interval: u64 },
}

fn interval_in_bounds(secs: u64) -> bool {
    (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs)
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !interval_in_bounds(self.default_interval) {
            return Err(ConfigError::DefaultInterval(self.default_interval));
        }
        Ok(())
    }
}

/// Validate every per-tab override. A zero interval means "no override".
pub fn validate_tabs(tabs: &BTreeMap<TabId, TabConfig>) -> Result<(), ConfigError> {
    for (&tab_id, config) in tabs {
        if let Some(interval) = config.interval.filter(|&i| i != 0) {
            if !interval_in_bounds(interval) {
                return Err(ConfigError::TabInterval { tab_id, interval });
            }
        }
    }
    Ok(())
}

/// The single persisted rotation record.
///
/// Missing fields deserialize to their defaults and `globalConfig` is merged
/// key by key, so a partial record written by an older build still loads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RotationState {
    pub status: Status,
    /// Index into the active tab list as of the last navigation
    pub current_index: usize,
    pub tabs_config: BTreeMap<TabId, TabConfig>,
    pub global_config: GlobalConfig,
    /// Wall-clock end of the current dwell; set only while running.
    /// Stored as epoch milliseconds.
    #[serde(
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub rotation_end_time: Option<DateTime<Utc>>,
}

impl RotationState {
    /// Whether the tab takes part in rotation (tabs without config do)
    pub fn is_included(&self, tab_id: TabId) -> bool {
        self.tabs_config
            .get(&tab_id)
            .map_or(true, |config| config.included)
    }

    /// Dwell for a tab: its override when set, the global default otherwise
    pub fn effective_interval(&self, tab_id: TabId) -> u64 {
        self.tabs_config
            .get(&tab_id)
            .and_then(|config| config.interval)
            .filter(|&secs| secs > 0)
            .unwrap_or(self.global_config.default_interval)
    }

    pub fn wants_refresh(&self, tab_id: TabId) -> bool {
        self.tabs_config
            .get(&tab_id)
            .is_some_and(|config| config.refresh_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_record_merges_global_config_key_by_key() {
        let raw = r#"{"status":"paused","globalConfig":{"defaultInterval":30}}"#;
        let state: RotationState = serde_json::from_str(raw).unwrap();

        assert_eq!(state.status, Status::Paused);
        assert_eq!(state.current_index, 0);
        assert_eq!(state.global_config.default_interval, 30);
        assert!(state.global_config.overlay_enabled);
        assert!(!state.global_config.idle_pause_enabled);
        assert!(state.rotation_end_time.is_none());
    }

    #[test]
    fn end_time_is_stored_as_epoch_millis() {
        let raw = r#"{"status":"running","rotationEndTime":1760780000123}"#;
        let state: RotationState = serde_json::from_str(raw).unwrap();
        let end = state.rotation_end_time.unwrap();
        assert_eq!(end.timestamp_millis(), 1_760_780_000_123);
        assert_eq!(state.status, Status::Running);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["rotationEndTime"], 1_760_780_000_123_i64);
    }

    #[test]
    fn tab_config_keys_round_trip_as_strings() {
        let mut state = RotationState::default();
        state.tabs_config.insert(
            42,
            TabConfig {
                interval: Some(5),
                ..TabConfig::default()
            },
        );
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["tabsConfig"]["42"]["interval"], 5);
        assert_eq!(json["tabsConfig"]["42"]["included"], true);

        let back: RotationState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn tab_override_falls_back_to_default() {
        let mut state = RotationState::default();
        state.global_config.default_interval = 12;
        state.tabs_config.insert(1, TabConfig { interval: Some(0), ..TabConfig::default() });
        state.tabs_config.insert(2, TabConfig { interval: Some(45), ..TabConfig::default() });

        assert_eq!(state.effective_interval(1), 12);
        assert_eq!(state.effective_interval(2), 45);
        assert_eq!(state.effective_interval(3), 12);
    }

    #[test]
    fn intervals_outside_bounds_are_rejected() {
        let config = GlobalConfig { default_interval: 0, ..GlobalConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::DefaultInterval(0)));

        let mut tabs = BTreeMap::new();
        tabs.insert(7, TabConfig { interval: Some(3601), ..TabConfig::default() });
        assert_eq!(
            validate_tabs(&tabs),
            Err(ConfigError::TabInterval { tab_id: 7, interval: 3601 })
        );

        tabs.insert(7, TabConfig { interval: Some(0), ..TabConfig::default() });
        assert!(validate_tabs(&tabs).is_ok());
    }
}
