//! Bridge to the on-page countdown indicator

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::navigator::active_tabs;
use crate::{
    host::{HostError, OverlayChannel, TabHost},
    state::{RotationState, Status, TabId},
};

/// Fallback label when the next tab has no title
const UNTITLED_NEXT: &str = "Next Tab";

/// Engine → indicator push protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum OverlayMessage {
    #[serde(rename = "COUNTDOWN")]
    Countdown {
        remaining: u64,
        next_title: String,
        status: Status,
    },
    #[serde(rename = "IDLE_PAUSE_STATE")]
    IdlePauseState { is_paused: bool },
    #[serde(rename = "CONFIG_UPDATED")]
    ConfigUpdated { idle_pause_enabled: bool },
    #[serde(rename = "HIDE_OVERLAY")]
    HideOverlay,
}

/// Indicator button presses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IndicatorAction {
    RequestStart,
    RequestPause,
    RequestNext,
    RequestPrevious,
}

/// Pushes countdown, idle and visibility updates to the indicator.
///
/// Every push is fire-and-forget: failures are logged and never reach the
/// navigation or command that caused them.
pub struct OverlayBridge {
    tabs: Arc<dyn TabHost>,
    channel: Arc<dyn OverlayChannel>,
}

impl OverlayBridge {
    pub fn new(tabs: Arc<dyn TabHost>, channel: Arc<dyn OverlayChannel>) -> Self {
        Self { tabs, channel }
    }

    /// Inject the indicator into `tab_id` when the overlay is enabled
    pub async fn ensure(&self, tab_id: TabId, overlay_enabled: bool) {
        if !overlay_enabled {
            return;
        }
        match self.channel.inject(tab_id).await {
            Ok(()) => {}
            Err(HostError::ScriptingRefused(_)) => {
                debug!("Could not inject overlay into restricted tab {}", tab_id);
            }
            Err(e) => debug!("Could not inject overlay into tab {}: {}", tab_id, e),
        }
    }

    /// Send the countdown to the foreground tab.
    ///
    /// When no indicator is listening yet, inject one and drop this update;
    /// the next tick reaches it.
    pub async fn push_countdown(&self, remaining: u64, state: &RotationState) {
        if !state.global_config.overlay_enabled {
            return;
        }

        let tabs = match self.tabs.query_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                debug!("Error updating countdown: {}", e);
                return;
            }
        };
        let active = active_tabs(&tabs, state);
        if active.is_empty() {
            return;
        }
        let next_index = (state.current_index + 1) % active.len();
        let next_title = active
            .get(next_index)
            .map(|tab| tab.title.clone())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNTITLED_NEXT.to_string());

        let Some(foreground) = self.foreground_tab().await else {
            return;
        };
        let message = OverlayMessage::Countdown {
            remaining,
            next_title,
            status: state.status,
        };
        if let Err(e) = self.channel.send(foreground, &message).await {
            debug!("Countdown not delivered to tab {}: {}", foreground, e);
            self.ensure(foreground, true).await;
        }
    }

    /// Tell the foreground indicator whether the countdown is idle-paused
    pub async fn push_idle_state(&self, is_paused: bool) {
        let Some(foreground) = self.foreground_tab().await else {
            return;
        };
        let message = OverlayMessage::IdlePauseState { is_paused };
        if let Err(e) = self.channel.send(foreground, &message).await {
            debug!("Idle state not delivered to tab {}: {}", foreground, e);
        }
    }

    /// Show the indicator on the foreground tab, or hide it everywhere
    pub async fn push_visibility(&self, show: bool, overlay_enabled: bool) {
        if show {
            if let Some(foreground) = self.foreground_tab().await {
                self.ensure(foreground, overlay_enabled).await;
            }
        } else {
            self.broadcast(&OverlayMessage::HideOverlay).await;
        }
    }

    /// Send `message` to every tab that has an indicator
    pub async fn broadcast(&self, message: &OverlayMessage) {
        let tabs = match self.tabs.query_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("Could not enumerate tabs for broadcast: {}", e);
                return;
            }
        };
        for tab in tabs {
            if let Err(e) = self.channel.send(tab.id, message).await {
                debug!("Broadcast skipped tab {}: {}", tab.id, e);
            }
        }
    }

    async fn foreground_tab(&self) -> Option<TabId> {
        match self.tabs.active_tab().await {
            Ok(tab) => tab.map(|t| t.id),
            Err(e) => {
                debug!("Could not resolve foreground tab: {}", e);
                None
            }
        }
    }
}
