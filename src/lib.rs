//! Tab Rotate - A kiosk tab rotation engine
//! 
//! This library cycles the open tabs of a browser window on a timer, with
//! pause/resume, manual navigation, per-tab overrides, idle-based
//! auto-pause and a live countdown shown on the page.

pub mod config;
pub mod state;
pub mod engine;
pub mod host;
pub mod api;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use state::{AppState, RotationState, Status};
pub use engine::{Command, CommandResponse, Engine, Hosts};
pub use api::create_router;
pub use utils::signals::shutdown_signal;
