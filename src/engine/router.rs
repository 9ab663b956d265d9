//! Single dispatch point for every external command

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{navigator::{Direction, NavigateOutcome}, overlay::{IndicatorAction, OverlayMessage}, Engine};
use crate::state::{validate_tabs, ConfigError, GlobalConfig, RotationState, Status, TabConfig, TabId};

/// Request side of the command protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "START")]
    Start,
    #[serde(rename = "PAUSE")]
    Pause,
    #[serde(rename = "STOP")]
    Stop,
    #[serde(rename = "NAV_NEXT")]
    NavigateNext,
    #[serde(rename = "NAV_PREV")]
    NavigatePrevious,
    #[serde(rename = "UPDATE_CONFIG", rename_all = "camelCase")]
    UpdateConfig {
        #[serde(alias = "config")]
        global_config: GlobalConfig,
        #[serde(default)]
        tabs_config: BTreeMap<TabId, TabConfig>,
    },
    #[serde(rename = "GET_STATE")]
    GetState,
    #[serde(rename = "IDLE_PAUSE")]
    IdlePauseSignal,
    #[serde(rename = "IDLE_RESUME")]
    IdleResumeSignal,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::NavigateNext => "nav-next",
            Command::NavigatePrevious => "nav-prev",
            Command::UpdateConfig { .. } => "update-config",
            Command::GetState => "get-state",
            Command::IdlePauseSignal => "idle-pause",
            Command::IdleResumeSignal => "idle-resume",
        }
    }
}

impl From<IndicatorAction> for Command {
    fn from(action: IndicatorAction) -> Self {
        match action {
            IndicatorAction::RequestStart => Command::Start,
            IndicatorAction::RequestPause => Command::Pause,
            IndicatorAction::RequestNext => Command::NavigateNext,
            IndicatorAction::RequestPrevious => Command::NavigatePrevious,
        }
    }
}

/// Response side of the command protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResponse {
    // Tried first: a snapshot never carries `success`
    Ack {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    State(RotationState),
}

impl CommandResponse {
    pub fn ok() -> Self {
        CommandResponse::Ack { success: true, error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        CommandResponse::Ack { success: false, error: Some(message.into()) }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandResponse::State(_) | CommandResponse::Ack { success: true, .. })
    }
}

impl Engine {
    /// Handle one command. Every command except `GetState` persists the
    /// record afterwards, whether or not it succeeded.
    pub async fn dispatch(&self, command: Command) -> CommandResponse {
        debug!("Dispatching {}", command.name());
        self.state().record_command(command.name());

        let result = match command {
            Command::GetState => return CommandResponse::State(self.state().snapshot()),
            Command::Start => {
                self.start_rotation().await;
                Ok(())
            }
            Command::Pause => {
                self.pause_rotation().await;
                Ok(())
            }
            Command::Stop => {
                self.stop_rotation().await;
                Ok(())
            }
            Command::NavigateNext => {
                self.navigate(Direction::Next).await;
                Ok(())
            }
            Command::NavigatePrevious => {
                self.navigate(Direction::Previous).await;
                Ok(())
            }
            Command::UpdateConfig { global_config, tabs_config } => {
                self.update_config(global_config, tabs_config).await
            }
            Command::IdlePauseSignal => {
                self.idle_pause().await;
                Ok(())
            }
            Command::IdleResumeSignal => {
                self.idle_resume().await;
                Ok(())
            }
        };

        self.store().save(self.state()).await;
        match result {
            Ok(()) => CommandResponse::ok(),
            Err(e) => {
                warn!("Rejected configuration: {}", e);
                CommandResponse::error(e.to_string())
            }
        }
    }

    async fn start_rotation(&self) {
        info!("Starting rotation");
        self.state().update(|s| s.status = Status::Running);
        self.store().update_icon(&self.state().snapshot()).await;
        self.store().save(self.state()).await;
        match self.navigate(Direction::Current).await {
            // The navigation in flight may have passed its arming step
            NavigateOutcome::Busy => {
                self.scheduler().recover(self.state()).await;
            }
            NavigateOutcome::NoTabs => info!("Rotation running, waiting for tabs"),
            _ => {}
        }
    }

    async fn pause_rotation(&self) {
        info!("Pausing rotation");
        self.state().update(|s| s.status = Status::Paused);
        self.idle().reset();
        self.store().update_icon(&self.state().snapshot()).await;
        self.scheduler().cancel(self.state()).await;
    }

    async fn stop_rotation(&self) {
        info!("Stopping rotation");
        self.state().update(|s| s.status = Status::Stopped);
        self.idle().reset();
        self.store().update_icon(&self.state().snapshot()).await;
        self.scheduler().cancel(self.state()).await;
        self.overlay().push_visibility(false, false).await;
    }

    async fn update_config(
        &self,
        global_config: GlobalConfig,
        tabs_config: BTreeMap<TabId, TabConfig>,
    ) -> Result<(), ConfigError> {
        global_config.validate()?;
        validate_tabs(&tabs_config)?;

        let idle_enabled = global_config.idle_pause_enabled;
        let overlay_enabled = global_config.overlay_enabled;
        let (overlay_was_enabled, running) = self.state().update(|s| {
            let was = s.global_config.overlay_enabled;
            s.global_config = global_config;
            s.tabs_config = tabs_config;
            (was, s.status.is_running())
        });
        info!("Configuration updated");

        if self.idle().set_enabled(idle_enabled) {
            self.scheduler().resume(self.state()).await;
            self.overlay().push_idle_state(false).await;
        }
        self.overlay()
            .broadcast(&OverlayMessage::ConfigUpdated { idle_pause_enabled: idle_enabled })
            .await;

        if overlay_was_enabled && !overlay_enabled {
            self.overlay().push_visibility(false, false).await;
        } else if overlay_enabled && running {
            self.overlay().push_visibility(true, true).await;
        }
        Ok(())
    }

    async fn idle_pause(&self) {
        if !self.state().read(|s| s.status.is_running()) {
            debug!("Ignoring idle pause outside a running rotation");
            return;
        }
        if self.scheduler().suspend(self.state()).await {
            self.overlay().push_idle_state(true).await;
        }
    }

    async fn idle_resume(&self) {
        if self.scheduler().resume(self.state()).await {
            self.overlay().push_idle_state(false).await;
        }
    }
}
