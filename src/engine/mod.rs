//! Rotation engine
//!
//! The engine owns the rotation record and wires the components together:
//! [`store`] persists it, [`navigator`] moves between tabs, [`scheduler`]
//! turns dwells into durable alarms, [`idle`] holds the countdown while the
//! kiosk is in use, [`overlay`] talks to the on-page indicator and
//! [`router`] is the one entry point for commands. Host lifecycle events
//! arrive through the hooks in [`lifecycle`].

pub mod idle;
pub mod lifecycle;
pub mod navigator;
pub mod overlay;
pub mod router;
pub mod scheduler;
pub mod store;

use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    host::{ActionHost, AlarmHost, OverlayChannel, StorageBackend, TabHost},
    state::AppState,
};

pub use idle::{ActivityKind, ActivityReport, IdleMonitor, IdleSignal};
pub use lifecycle::Shortcut;
pub use navigator::{Direction, NavigateOutcome};
pub use overlay::{IndicatorAction, OverlayBridge, OverlayMessage};
pub use router::{Command, CommandResponse};
pub use scheduler::{Scheduler, COUNTDOWN_ALARM, ROTATION_ALARM};
pub use store::{StateStore, STATE_KEY};

/// Capability providers the engine runs against
#[derive(Clone)]
pub struct Hosts {
    pub tabs: Arc<dyn TabHost>,
    pub action: Arc<dyn ActionHost>,
    pub overlay: Arc<dyn OverlayChannel>,
    pub alarms: Arc<dyn AlarmHost>,
    pub storage: Arc<dyn StorageBackend>,
}

struct EngineInner {
    state: AppState,
    hosts: Hosts,
    store: StateStore,
    overlay: Arc<OverlayBridge>,
    scheduler: Scheduler,
    idle: IdleMonitor,
}

/// Cheaply cloneable handle to the rotation engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build the engine and start forwarding idle signals into the router.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(hosts: Hosts) -> Self {
        let overlay = Arc::new(OverlayBridge::new(
            Arc::clone(&hosts.tabs),
            Arc::clone(&hosts.overlay),
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&hosts.alarms),
            Arc::clone(&hosts.action),
            Arc::clone(&overlay),
        );
        let store = StateStore::new(Arc::clone(&hosts.storage), Arc::clone(&hosts.action));
        let (idle, idle_rx) = IdleMonitor::new();

        let engine = Self {
            inner: Arc::new(EngineInner {
                state: AppState::new(),
                hosts,
                store,
                overlay,
                scheduler,
                idle,
            }),
        };
        tokio::spawn(forward_idle_signals(Arc::downgrade(&engine.inner), idle_rx));
        engine
    }

    pub fn state(&self) -> &AppState {
        &self.inner.state
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn overlay(&self) -> &OverlayBridge {
        &self.inner.overlay
    }

    pub fn idle(&self) -> &IdleMonitor {
        &self.inner.idle
    }

    pub fn hosts(&self) -> &Hosts {
        &self.inner.hosts
    }

    fn tabs(&self) -> &dyn TabHost {
        self.inner.hosts.tabs.as_ref()
    }

    fn action(&self) -> &dyn ActionHost {
        self.inner.hosts.action.as_ref()
    }

    /// Handle an indicator button press
    pub async fn handle_indicator(&self, action: IndicatorAction) -> CommandResponse {
        self.dispatch(Command::from(action)).await
    }
}

/// Turn idle monitor signals into router commands until the engine is dropped
async fn forward_idle_signals(engine: Weak<EngineInner>, mut rx: mpsc::UnboundedReceiver<IdleSignal>) {
    while let Some(signal) = rx.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        let engine = Engine { inner };
        let command = match signal {
            IdleSignal::Pause => Command::IdlePauseSignal,
            IdleSignal::Resume => Command::IdleResumeSignal,
        };
        engine.dispatch(command).await;
    }
    debug!("Idle signal forwarder stopped");
}
