//! Host capability contracts
//!
//! The engine never talks to a browser directly. Tabs, the toolbar action,
//! page scripting, alarms and storage are capability providers behind these
//! traits; `LocalBrowser`, `LocalAlarms` and the storage backends are the
//! implementations shipped with the daemon.

pub mod alarms;
pub mod browser;
pub mod storage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    engine::overlay::OverlayMessage,
    state::{IconColor, TabId},
};

pub use alarms::LocalAlarms;
pub use browser::{HostEvent, LocalBrowser};
pub use storage::{FileStorage, MemoryStorage};

/// Failure of a host call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("tab {0} no longer exists")]
    TabNotFound(TabId),
    #[error("scripting refused for tab {0}")]
    ScriptingRefused(TabId),
    #[error("no indicator listening in tab {0}")]
    NoReceiver(TabId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// A tab as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub active: bool,
}

/// Tab management for the rotated window
#[async_trait]
pub trait TabHost: Send + Sync {
    /// Tabs of the rotated window, in window order
    async fn query_tabs(&self) -> Result<Vec<Tab>, HostError>;

    async fn get_tab(&self, tab_id: TabId) -> Result<Tab, HostError>;

    /// The tab currently in the foreground, if any
    async fn active_tab(&self) -> Result<Option<Tab>, HostError>;

    async fn activate(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn reload(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn is_fullscreen(&self) -> Result<bool, HostError>;

    async fn request_fullscreen(&self) -> Result<(), HostError>;
}

/// Toolbar icon and badge
#[async_trait]
pub trait ActionHost: Send + Sync {
    async fn set_icon(&self, color: IconColor) -> Result<(), HostError>;

    /// Empty `text` clears the badge
    async fn set_badge(&self, text: &str, color: Option<&str>) -> Result<(), HostError>;
}

/// Injection of, and messaging with, the on-page indicator
#[async_trait]
pub trait OverlayChannel: Send + Sync {
    async fn inject(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn send(&self, tab_id: TabId, message: &OverlayMessage) -> Result<(), HostError>;
}

/// Schedule of a durable alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmSpec {
    /// Wall-clock instant of the next firing
    pub when: DateTime<Utc>,
    /// Repeat period in milliseconds; one-shot when absent
    pub period_ms: Option<u64>,
}

/// Named alarms keyed by wall-clock deadlines
#[async_trait]
pub trait AlarmHost: Send + Sync {
    /// Create or replace the alarm called `name`
    async fn create(&self, name: &str, spec: AlarmSpec) -> Result<(), HostError>;

    /// Returns whether an alarm was removed
    async fn clear(&self, name: &str) -> Result<bool, HostError>;

    async fn clear_all(&self) -> Result<(), HostError>;

    async fn get(&self, name: &str) -> Result<Option<AlarmSpec>, HostError>;
}

/// Opaque durable key-value store
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError>;
}
