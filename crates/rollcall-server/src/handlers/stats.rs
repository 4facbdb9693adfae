//! Usage statistics. These read the cache directly, so an unreachable cache
//! answers 503.

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiQuery};
use crate::state::AppState;

const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).min(MAX_LIMIT)
    }
}

pub async fn today(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.usage.today_summary().await?))
}

pub async fn slowest(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.usage.slowest(query.resolve(10)).await?))
}

pub async fn recent(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.usage.recent(query.resolve(20)).await?))
}

pub async fn endpoints_for_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let day = rollcall_core::normalize_day(&date)?;
    Ok(Json(state.usage.breakdown(&day).await?))
}
