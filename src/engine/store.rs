//! Load and save of the persisted rotation record

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::{
    host::{ActionHost, StorageBackend},
    state::{AppState, RotationState},
};

/// Storage key of the rotation record
pub const STATE_KEY: &str = "kioskState";

/// Owns the single persisted rotation record
pub struct StateStore {
    storage: Arc<dyn StorageBackend>,
    action: Arc<dyn ActionHost>,
}

impl StateStore {
    pub fn new(storage: Arc<dyn StorageBackend>, action: Arc<dyn ActionHost>) -> Self {
        Self { storage, action }
    }

    /// Merge the persisted record over defaults into `state` and tint the
    /// icon to match. A storage failure keeps the in-memory record.
    pub async fn load(&self, state: &AppState) -> RotationState {
        match self.storage.get(STATE_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<RotationState>(value) {
                Ok(loaded) => {
                    debug!("Loaded rotation state: status={:?}", loaded.status);
                    state.replace(loaded);
                }
                Err(e) => warn!("Persisted rotation state unreadable, using defaults: {}", e),
            },
            Ok(None) => debug!("No persisted rotation state, using defaults"),
            Err(e) => error!("Error loading state: {}", e),
        }

        let loaded = state.snapshot();
        self.update_icon(&loaded).await;
        loaded
    }

    /// Write the full record. Failures are logged; the next successful save
    /// catches storage up with memory.
    pub async fn save(&self, state: &AppState) -> bool {
        let value = match serde_json::to_value(state.snapshot()) {
            Ok(value) => value,
            Err(e) => {
                error!("Error encoding state: {}", e);
                return false;
            }
        };
        match self.storage.set(STATE_KEY, value).await {
            Ok(()) => true,
            Err(e) => {
                error!("Error saving state: {}", e);
                false
            }
        }
    }

    /// Tint the toolbar icon for the record's status
    pub async fn update_icon(&self, rotation: &RotationState) {
        if let Err(e) = self.action.set_icon(rotation.status.icon_color()).await {
            warn!("Error updating icon: {}", e);
        }
    }
}
