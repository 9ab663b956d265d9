//! Host lifecycle hooks

use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{
    idle::ActivityReport,
    navigator::{active_tabs, Direction},
    router::{Command, CommandResponse},
    scheduler::{COUNTDOWN_ALARM, ROTATION_ALARM},
    Engine,
};
use crate::state::{Status, TabId};

/// Keyboard shortcuts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    /// Pause when running, start otherwise
    ToggleRotation,
    NextTab,
}

impl FromStr for Shortcut {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "toggle-rotation" => Ok(Shortcut::ToggleRotation),
            "next-tab" => Ok(Shortcut::NextTab),
            other => Err(format!("unknown shortcut: {}", other)),
        }
    }
}

impl Engine {
    /// First run after install or update. No alarm survives an install, so
    /// a record left running is demoted to stopped.
    pub async fn on_installed(&self) {
        let loaded = self.store().load(self.state()).await;
        self.idle().set_enabled(loaded.global_config.idle_pause_enabled);
        if let Err(e) = self.hosts().alarms.clear_all().await {
            warn!("Failed to clear alarms on install: {}", e);
        }
        let demoted = self.state().update(|s| {
            s.rotation_end_time = None;
            if s.status.is_running() {
                s.status = Status::Stopped;
                true
            } else {
                false
            }
        });
        if demoted {
            info!("Rotation was running before install, stopped");
        }
        self.store().update_icon(&self.state().snapshot()).await;
        self.store().save(self.state()).await;
    }

    /// Process (re)start: reload the record, honour auto-start, and re-arm a
    /// running rotation whose alarm was lost
    pub async fn on_startup(&self) {
        let loaded = self.store().load(self.state()).await;
        self.idle().set_enabled(loaded.global_config.idle_pause_enabled);

        if loaded.global_config.auto_start && loaded.status != Status::Running {
            info!("Auto-start enabled, starting rotation");
            self.dispatch(Command::Start).await;
            return;
        }
        if self.scheduler().recover(self.state()).await {
            self.store().save(self.state()).await;
        }
    }

    /// A durable alarm fired
    pub async fn on_alarm(&self, name: &str) {
        match name {
            ROTATION_ALARM => {
                self.rotate().await;
            }
            COUNTDOWN_ALARM => {
                self.scheduler().tick(self.state()).await;
            }
            other => debug!("Ignoring unknown alarm {}", other),
        }
    }

    /// The user brought a tab to the foreground
    pub async fn on_tab_activated(&self, tab_id: TabId) {
        let overlay_enabled = self.state().read(|s| s.global_config.overlay_enabled);
        self.overlay().ensure(tab_id, overlay_enabled).await;
    }

    /// A tab opened. A running rotation left without a timer because it
    /// had nothing to show picks the new tab up.
    pub async fn on_tab_created(&self, tab_id: TabId) {
        debug!("Tab {} opened", tab_id);
        if !self.state().read(|s| s.status.is_running())
            || self.scheduler().is_suspended()
            || self.scheduler().pending().await.is_some()
        {
            return;
        }
        info!("Rotation had no timer, picking up tab {}", tab_id);
        self.navigate(Direction::Current).await;
    }

    /// A tab closed: drop its config and refresh record, and pull the
    /// index back into range
    pub async fn on_tab_removed(&self, tab_id: TabId) {
        self.state().update(|s| s.tabs_config.remove(&tab_id));
        self.state().refresh_registry().forget(tab_id);

        match self.tabs().query_tabs().await {
            Ok(tabs) => {
                self.state().update(|s| {
                    let remaining = active_tabs(&tabs, s).len();
                    if remaining > 0 && s.current_index >= remaining {
                        s.current_index = remaining - 1;
                    }
                });
            }
            Err(e) => warn!("Could not enumerate tabs after removal: {}", e),
        }
        debug!("Tab {} removed", tab_id);
        self.store().save(self.state()).await;
    }

    /// Keyboard shortcut pressed
    pub async fn on_shortcut(&self, shortcut: Shortcut) -> CommandResponse {
        let command = match shortcut {
            Shortcut::ToggleRotation if self.state().read(|s| s.status.is_running()) => Command::Pause,
            Shortcut::ToggleRotation => Command::Start,
            Shortcut::NextTab => Command::NavigateNext,
        };
        self.dispatch(command).await
    }

    /// Page activity from the indicator script. Idle-pause only exists
    /// while running.
    pub fn report_activity(&self, report: &ActivityReport) -> bool {
        if !self.state().read(|s| s.status.is_running()) {
            return false;
        }
        self.idle().record_activity(report)
    }

    /// Host is about to unload the process
    pub async fn on_shutdown(&self) {
        info!("Saving rotation state before shutdown");
        self.store().save(self.state()).await;
    }
}
