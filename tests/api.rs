mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{fixture, Fixture};
use tab_rotate::{api::ApiState, create_router, state::Status};

fn router(fx: &Fixture) -> Router {
    create_router(Arc::new(ApiState {
        engine: fx.engine.clone(),
        browser: fx.browser.clone(),
        port: 20554,
        host: "127.0.0.1".to_string(),
    }))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn command_endpoint_speaks_the_protocol() {
    let fx = fixture(3);
    let app = router(&fx);

    let response = app.clone().oneshot(post_json("/command", json!({"type": "START"}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"success": true}));

    let response = app.oneshot(post_json("/command", json!({"type": "GET_STATE"}))).await.unwrap();
    let state = json_body(response).await;
    assert_eq!(state["status"], json!("running"));
    assert_eq!(state["currentIndex"], json!(0));
    assert_eq!(state["globalConfig"]["defaultInterval"], json!(10));
}

#[tokio::test]
async fn rejected_config_reports_the_reason() {
    let fx = fixture(1);
    let body = json!({"type": "UPDATE_CONFIG", "globalConfig": {"defaultInterval": 5000}});
    let response = router(&fx).oneshot(post_json("/command", body)).await.unwrap();

    let reply = json_body(response).await;
    assert_eq!(reply["success"], json!(false));
    assert!(reply["error"].as_str().unwrap().contains("5000"));
}

#[tokio::test]
async fn unknown_command_type_is_a_client_error() {
    let fx = fixture(1);
    let response = router(&fx)
        .oneshot(post_json("/command", json!({"type": "REBOOT"})))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn indicator_buttons_map_to_commands() {
    let fx = fixture(2);
    let app = router(&fx);
    app.clone()
        .oneshot(post_json("/indicator", json!({"type": "requestStart"})))
        .await
        .unwrap();
    app.oneshot(post_json("/indicator", json!({"type": "requestNext"})))
        .await
        .unwrap();

    assert_eq!(fx.engine.state().snapshot().status, Status::Running);
    assert_eq!(fx.browser.badge(), "2/2");
}

#[tokio::test]
async fn shortcuts_resolve_by_name() {
    let fx = fixture(2);
    let app = router(&fx);

    let response = app
        .clone()
        .oneshot(Request::post("/shortcut/toggle-rotation").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fx.engine.state().snapshot().status, Status::Running);

    let response = app
        .oneshot(Request::post("/shortcut/reload-all").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tab_sync_keeps_the_registry_current() {
    let fx = fixture(2);
    let app = router(&fx);

    let opened = json!({"id": 9, "title": "Weather", "url": "https://weather.example", "active": false});
    let request = Request::put("/tabs")
        .header("content-type", "application/json")
        .body(Body::from(opened.to_string()))
        .unwrap();
    assert_eq!(app.clone().oneshot(request).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(fx.browser.tab_count(), 3);

    let closed = Request::delete("/tabs/9").body(Body::empty()).unwrap();
    assert_eq!(app.clone().oneshot(closed).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(fx.browser.tab_count(), 2);

    let again = Request::delete("/tabs/9").body(Body::empty()).unwrap();
    assert_eq!(app.clone().oneshot(again).await.unwrap().status(), StatusCode::NOT_FOUND);

    let activated = Request::post("/tabs/2/activated").body(Body::empty()).unwrap();
    assert_eq!(app.oneshot(activated).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(fx.browser.active_tab_id(), Some(2));
    assert!(fx.browser.has_indicator(2));
}

#[tokio::test]
async fn activity_is_a_no_op_while_stopped() {
    let fx = fixture(1);
    let response = router(&fx)
        .oneshot(post_json("/activity", json!({"kind": "pointer"})))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({"paused": false, "idlePaused": false}));
}

#[tokio::test]
async fn status_reports_runtime_details() {
    let fx = fixture(2);
    let app = router(&fx);
    app.clone()
        .oneshot(post_json("/command", json!({"type": "PAUSE"})))
        .await
        .unwrap();

    let response = app.oneshot(Request::get("/status").body(Body::empty()).unwrap()).await.unwrap();
    let status = json_body(response).await;
    assert_eq!(status["state"]["status"], json!("paused"));
    assert_eq!(status["lastCommand"], json!("pause"));
    assert_eq!(status["navigating"], json!(false));
    assert_eq!(status["port"], json!(20554));
}

#[tokio::test]
async fn health_is_always_ok() {
    let fx = fixture(1);
    let response = router(&fx)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], json!("ok"));
}

#[tokio::test]
async fn first_opened_tab_starts_a_waiting_rotation() {
    let fx = fixture(0);
    let app = router(&fx);
    app.clone().oneshot(post_json("/command", json!({"type": "START"}))).await.unwrap();
    assert!(fx.engine.scheduler().pending().await.is_none());

    let opened = json!({"id": 4, "title": "Queue", "url": "https://queue.example", "active": false});
    let request = Request::put("/tabs")
        .header("content-type", "application/json")
        .body(Body::from(opened.to_string()))
        .unwrap();
    assert_eq!(app.oneshot(request).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(fx.browser.active_tab_id(), Some(4));
    assert!(fx.engine.scheduler().pending().await.is_some());
}
