pub mod attendance;
pub mod stats;
pub mod students;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

#[derive(Debug, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub db: bool,
    pub cache: bool,
}

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": state.config.app.name,
        "version": state.config.app.version,
        "status": "ok",
    }))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Ready when the store answers. A cache outage is reported but only
/// degrades the service.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let db = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "readiness: store ping failed");
            false
        }
    };
    let cache = match state.kv.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "readiness: cache ping failed");
            false
        }
    };
    let status = if db {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready: db,
            db,
            cache,
        }),
    )
}

pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics recorder not installed".to_string(),
        )
            .into_response(),
    }
}
