//! State management module
//! 
//! This module contains the persisted rotation record and the ephemeral
//! runtime state that sits next to it.

pub mod app_state;
pub mod refresh_registry;
pub mod rotation_state;

// Re-export main types
pub use app_state::{AppState, NavigationGuard};
pub use refresh_registry::RefreshRegistry;
pub use rotation_state::{
    validate_tabs, ConfigError, GlobalConfig, IconColor, RotationState, Status, TabConfig, TabId,
};
