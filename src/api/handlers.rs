//! HTTP endpoint handlers

use std::{convert::Infallible, sync::Arc};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::{
    engine::{ActivityReport, Command, CommandResponse, IndicatorAction, Shortcut},
    host::Tab,
    state::TabId,
};
use super::{
    responses::{ActivityResponse, HealthResponse, StatusResponse},
    ApiState,
};

/// Handle POST /command - The command protocol
pub async fn command_handler(
    State(state): State<Arc<ApiState>>,
    Json(command): Json<Command>,
) -> Json<CommandResponse> {
    Json(state.engine.dispatch(command).await)
}

/// Handle POST /indicator - Indicator button presses
pub async fn indicator_handler(
    State(state): State<Arc<ApiState>>,
    Json(action): Json<IndicatorAction>,
) -> Json<CommandResponse> {
    Json(state.engine.handle_indicator(action).await)
}

/// Handle POST /activity - Page activity for idle-pause
pub async fn activity_handler(
    State(state): State<Arc<ApiState>>,
    Json(report): Json<ActivityReport>,
) -> Json<ActivityResponse> {
    let paused = state.engine.report_activity(&report);
    Json(ActivityResponse {
        paused,
        idle_paused: state.engine.idle().is_idle_paused(),
    })
}

/// Handle POST /shortcut/:name - Keyboard shortcuts
pub async fn shortcut_handler(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<CommandResponse>, StatusCode> {
    match name.parse::<Shortcut>() {
        Ok(shortcut) => Ok(Json(state.engine.on_shortcut(shortcut).await)),
        Err(e) => {
            warn!("{}", e);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

/// Handle PUT /tabs - A tab opened or changed title/URL
pub async fn upsert_tab_handler(
    State(state): State<Arc<ApiState>>,
    Json(tab): Json<Tab>,
) -> StatusCode {
    let tab_id = tab.id;
    if state.browser.upsert_tab(tab) {
        state.engine.on_tab_created(tab_id).await;
    }
    StatusCode::NO_CONTENT
}

/// Handle DELETE /tabs/:tab_id - A tab closed
pub async fn remove_tab_handler(
    State(state): State<Arc<ApiState>>,
    Path(tab_id): Path<TabId>,
) -> StatusCode {
    if !state.browser.remove_tab(tab_id) {
        return StatusCode::NOT_FOUND;
    }
    state.engine.on_tab_removed(tab_id).await;
    StatusCode::NO_CONTENT
}

/// Handle POST /tabs/:tab_id/activated - The user switched tabs
pub async fn tab_activated_handler(
    State(state): State<Arc<ApiState>>,
    Path(tab_id): Path<TabId>,
) -> StatusCode {
    if !state.browser.mark_active(tab_id) {
        return StatusCode::NOT_FOUND;
    }
    state.engine.on_tab_activated(tab_id).await;
    StatusCode::NO_CONTENT
}

/// Handle GET /events - Stream browser actions to the companion
pub async fn events_handler(
    State(state): State<Arc<ApiState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Companion subscribed to host events");
    let rx = state.browser.subscribe();

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .json_data(&event)
                        .unwrap_or_else(|_| Event::default().comment("unencodable event"));
                    return Some((Ok(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Companion lagging, {} host events dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Handle GET /status - Return current rotation status
pub async fn status_handler(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let engine = &state.engine;
    let (last_command, last_command_time) = match engine.state().last_command() {
        Some((command, at)) => (Some(command), Some(at)),
        None => (None, None),
    };

    Json(StatusResponse {
        state: engine.state().snapshot(),
        navigating: engine.state().is_navigating(),
        idle_paused: engine.idle().is_idle_paused(),
        countdown_suspended: engine.scheduler().is_suspended(),
        uptime: engine.state().get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_command,
        last_command_time,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
