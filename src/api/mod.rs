//! HTTP API module
//! 
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{engine::Engine, host::LocalBrowser};
use handlers::*;

/// Shared handler state
pub struct ApiState {
    pub engine: Engine,
    pub browser: Arc<LocalBrowser>,
    pub port: u16,
    pub host: String,
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/command", post(command_handler))
        .route("/indicator", post(indicator_handler))
        .route("/activity", post(activity_handler))
        .route("/shortcut/:name", post(shortcut_handler))
        // Companion sync of the browser's tab set
        .route("/tabs", put(upsert_tab_handler))
        .route("/tabs/:tab_id", delete(remove_tab_handler))
        .route("/tabs/:tab_id/activated", post(tab_activated_handler))
        .route("/events", get(events_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
