use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use super::{AppState, failure, success};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema, utoipa::IntoParams))]
pub struct LogsParams {
    pub limit: Option<usize>,
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/logs", params(LogsParams), responses((status = 200))))]
pub async fn get_logs(State(state): State<AppState>, Query(params): Query<LogsParams>) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let recorder = state.recorder.clone();
    match tokio::task::spawn_blocking(move || recorder.recent(limit)).await {
        Ok(Ok(rows)) => success(json!({ "count": rows.len(), "logs": rows })),
        Ok(Err(e)) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/logs/cleanup", responses((status = 200))))]
pub async fn cleanup_logs(State(state): State<AppState>) -> Response {
    let retention_days = state.store.get().await.logging.csv_retention_days;
    let recorder = state.recorder.clone();
    match tokio::task::spawn_blocking(move || recorder.cleanup(retention_days)).await {
        Ok(Ok(removed)) => success(json!({
            "removed_count": removed,
            "retention_days": retention_days,
        })),
        Ok(Err(e)) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
