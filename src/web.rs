//! Axum-based HTTP server: status, configuration and manual control
//!
//! Handlers never touch the socket directly. Control requests are written to
//! the configuration store and the control loop is woken to apply them, so the
//! loop stays the only writer of the load state.

use crate::config::ConfigStore;
use crate::config::merge::{FieldUpdate, updates_from_map};
use crate::controller::{ControllerHandle, ShutdownSignal};
use crate::recorder::Recorder;
use axum::extract::rejection::JsonRejection;
use axum::response::Redirect;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, get_service, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower_http::services::ServeDir;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod records;

#[derive(Clone)]
pub struct AppState {
    pub store: ConfigStore,
    pub controller: ControllerHandle,
    pub recorder: Arc<dyn Recorder>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConfigUpdateBody {
    /// Dotted key paths mapped to their new values
    pub updates: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SocketBody {
    pub state: bool,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AutoModeBody {
    pub enabled: bool,
}

/// `{"success": true, ...fields}`
pub(crate) fn success(mut body: Value) -> Response {
    match body.as_object_mut() {
        Some(obj) => {
            obj.insert("success".to_string(), Value::Bool(true));
        }
        None => body = json!({ "success": true, "data": body }),
    }
    (StatusCode::OK, Json(body)).into_response()
}

/// `{"success": false, "error": message}`
pub(crate) fn failure(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.to_string() })),
    )
        .into_response()
}

async fn apply(state: &AppState, updates: &[FieldUpdate]) -> Result<(), Response> {
    state.store.update(updates).await.map(|_| ()).map_err(|e| {
        let status = if e.is_configuration() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        failure(status, e)
    })
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Service is healthy")
)))]
pub async fn health() -> impl IntoResponse {
    success(json!({ "status": "ok", "version": env!("APP_VERSION") }))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/status", responses(
    (status = 200, description = "Last cycle snapshot with live thresholds")
)))]
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.store.get().await;
    let snap = state.controller.snapshot();
    let now = Utc::now();

    let thresholds = crate::thresholds::compute(&config.electrical).ok();
    // Recomputed here; the snapshot value is only as fresh as the last cycle
    let is_night =
        crate::night::is_night_at(now, &config.night_mode, &config.timezone).unwrap_or(false);
    let age = |t: Option<DateTime<Utc>>| t.map(|t| (now - t).num_seconds().max(0));

    success(json!({
        "snapshot": &*snap,
        "power_threshold_on": thresholds.map(|t| t.on_w),
        "power_threshold_off": thresholds.map(|t| t.off_w),
        "is_night": is_night,
        "stable_on_for_s": age(snap.stable_on_since),
        "stable_off_for_s": age(snap.stable_off_since),
        "since_last_switch_s": age(snap.last_switched_at),
        "config": {
            "electrical": config.electrical,
            "sampling": config.sampling,
            "night_mode": config.night_mode,
            "control": config.control,
            "timezone": config.timezone,
        },
    }))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config", responses((status = 200))))]
pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.store.get().await.redacted();
    success(json!({ "config": config }))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/config", request_body = ConfigUpdateBody, responses(
    (status = 200, description = "Updated"),
    (status = 400, description = "Missing or invalid updates")
)))]
pub async fn post_config(
    State(state): State<AppState>,
    body: Result<Json<ConfigUpdateBody>, JsonRejection>,
) -> Response {
    let updates = match body {
        Ok(Json(ConfigUpdateBody {
            updates: Some(map),
        })) if !map.is_empty() => updates_from_map(&map),
        Ok(_) => return failure(StatusCode::BAD_REQUEST, "No updates provided"),
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };
    if let Err(resp) = apply(&state, &updates).await {
        return resp;
    }
    let config = state.store.get().await.redacted();
    success(json!({ "message": "Configuration updated", "config": config }))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/socket", request_body = SocketBody, responses((status = 200))))]
pub async fn post_socket(
    State(state): State<AppState>,
    body: Result<Json<SocketBody>, JsonRejection>,
) -> Response {
    let on = match body {
        Ok(Json(b)) => b.state,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };
    let updates = vec![
        ("control.manual_socket_state".to_string(), Value::Bool(on)),
        ("control.auto_mode".to_string(), Value::Bool(false)),
    ];
    if let Err(resp) = apply(&state, &updates).await {
        return resp;
    }
    state.controller.request_cycle();
    success(json!({ "state": on, "auto_mode": false }))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/auto_mode", request_body = AutoModeBody, responses((status = 200))))]
pub async fn post_auto_mode(
    State(state): State<AppState>,
    body: Result<Json<AutoModeBody>, JsonRejection>,
) -> Response {
    let enabled = match body {
        Ok(Json(b)) => b.enabled,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };
    let mut updates = vec![("control.auto_mode".to_string(), Value::Bool(enabled))];
    let mut manual_state = None;
    if !enabled {
        // Keep the socket where it is when handing over to manual control
        let current = state.controller.snapshot().socket_on;
        updates.push((
            "control.manual_socket_state".to_string(),
            Value::Bool(current),
        ));
        manual_state = Some(current);
    }
    if let Err(resp) = apply(&state, &updates).await {
        return resp;
    }
    state.controller.request_cycle();
    success(json!({ "auto_mode": enabled, "manual_socket_state": manual_state }))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/events", responses((status = 200))))]
pub async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.controller.subscribe_events();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok::<Event, std::convert::Infallible>(
            Event::default().event("cycle").data(payload),
        )),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(feature = "openapi")]
pub async fn config_schema() -> impl IntoResponse {
    Json(schemars::schema_for!(crate::config::Config))
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        health, status, get_config, post_config, post_socket, post_auto_mode, events,
        records::get_logs, records::cleanup_logs,
    ),
    components(schemas(ConfigUpdateBody, SocketBody, AutoModeBody, crate::recorder::RecordedEntry)),
    tags((name = "helios", description = "Helios solar socket controller API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(|| async { Redirect::to("/ui/") }))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/config", get(get_config).post(post_config))
        .route("/api/socket", post(post_socket))
        .route("/api/auto_mode", post(post_auto_mode))
        .route("/api/logs", get(records::get_logs))
        .route("/api/logs/cleanup", post(records::cleanup_logs))
        .route("/api/events", get(events))
        .nest_service(
            "/ui",
            get_service(ServeDir::new("./webui").append_index_html_on_directories(true))
                .handle_error(|_| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router
            .route("/api/config/schema", get(config_schema))
            .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
    };

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` fires
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    mut shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    let router = build_router(state);
    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (UI /ui, API /api)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    logger.info("Web server stopped");
    Ok(())
}
