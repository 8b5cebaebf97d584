mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{FakeSocket, Harness, at, test_config};
use helios::Controller;
use helios::recorder::{RecordedEntry, Recorder};
use helios::web::{AppState, build_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn setup(socket_on: bool) -> (Harness, Controller, AppState) {
    let h = Harness::new(test_config(), FakeSocket::starting(socket_on));
    let ctl = h.controller().await;
    let state = AppState {
        store: h.store.clone(),
        controller: ctl.handle(),
        recorder: h.recorder.clone(),
    };
    (h, ctl, state)
}

async fn call(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
    let resp = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let (_h, _ctl, state) = setup(false).await;
    let (status, body) = call(&state, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn status_includes_live_thresholds_and_snapshot() {
    let (h, mut ctl, state) = setup(false).await;
    h.power.push(2100.0);
    ctl.run_cycle(at(0)).await;

    let (status, body) = call(&state, get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["power_threshold_on"], 2000);
    assert_eq!(body["power_threshold_off"], 1750);
    assert_eq!(body["is_night"], false);
    assert_eq!(body["snapshot"]["power_w"], 2100.0);
    assert_eq!(body["snapshot"]["socket_on"], false);
    assert!(body["stable_on_for_s"].is_number());
    assert!(body["config"].get("solaredge").is_none());
}

#[tokio::test]
async fn config_is_redacted() {
    let (h, _ctl, state) = setup(false).await;
    h.store
        .update(&[("hue.app_key".to_string(), json!("secret-key"))])
        .await
        .unwrap();
    let (status, body) = call(&state, get("/api/config")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["hue"]["app_key"], "***");
    assert_eq!(body["config"]["web"]["port"], 5050);
}

#[tokio::test]
async fn config_update_validates_input() {
    let (h, _ctl, state) = setup(false).await;

    let (status, body) = call(&state, post("/api/config", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let (status, _) = call(
        &state,
        post("/api/config", json!({ "updates": { "sampling.window_s": 0 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.store.get().await.sampling.window_s, 300);

    let (status, body) = call(
        &state,
        post(
            "/api/config",
            json!({ "updates": { "sampling.window_s": 600, "night_mode.enabled": true } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let cfg = h.store.get().await;
    assert_eq!(cfg.sampling.window_s, 600);
    assert!(cfg.night_mode.enabled);
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let (_h, _ctl, state) = setup(false).await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/socket")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"state\": maybe}"))
        .unwrap();
    let (status, body) = call(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn socket_request_goes_through_the_loop() {
    let (h, mut ctl, state) = setup(false).await;

    let (status, body) = call(&state, post("/api/socket", json!({ "state": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], true);

    let cfg = h.store.get().await;
    assert!(!cfg.control.auto_mode);
    assert_eq!(cfg.control.manual_socket_state, Some(true));
    // The handler never drives the socket itself
    assert!(h.socket.requests().is_empty());

    h.power.push(0.0);
    let snap = ctl.run_cycle(at(0)).await;
    assert!(snap.socket_on);
    assert_eq!(h.socket.requests(), vec![true]);
}

#[tokio::test]
async fn disabling_auto_mode_captures_current_state() {
    let (h, mut ctl, state) = setup(true).await;
    h.power.push(3000.0);
    ctl.run_cycle(at(0)).await;

    let (status, body) = call(&state, post("/api/auto_mode", json!({ "enabled": false }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["manual_socket_state"], true);
    let cfg = h.store.get().await;
    assert!(!cfg.control.auto_mode);
    assert_eq!(cfg.control.manual_socket_state, Some(true));

    let (status, _) = call(&state, post("/api/auto_mode", json!({ "enabled": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.store.get().await.control.auto_mode);
}

#[tokio::test]
async fn logs_endpoint_returns_recent_rows() {
    let (h, _ctl, state) = setup(false).await;
    for i in 0..3 {
        h.recorder.append(&RecordedEntry {
            timestamp: format!("2024-06-01T12:00:0{}+00:00", i),
            power_w: 100.0 * i as f64,
            avg_w: 0.0,
            median_w: 0.0,
            socket_on: false,
            auto_mode: true,
        });
    }

    let (status, body) = call(&state, get("/api/logs?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["logs"][1]["power_w"], 200.0);

    let (_, body) = call(&state, get("/api/logs")).await;
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn cleanup_endpoint_uses_configured_retention() {
    let (h, _ctl, state) = setup(false).await;
    h.store
        .update(&[("logging.csv_retention_days".to_string(), json!(14))])
        .await
        .unwrap();
    let (status, body) = call(&state, post("/api/logs/cleanup", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed_count"], 0);
    assert_eq!(body["retention_days"], 14);
    assert_eq!(*h.recorder.cleanups.lock().unwrap(), vec![14]);
}

#[tokio::test]
async fn root_redirects_to_ui() {
    let (_h, _ctl, state) = setup(false).await;
    let resp = build_router(state).oneshot(get("/")).await.unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/ui/");
}
