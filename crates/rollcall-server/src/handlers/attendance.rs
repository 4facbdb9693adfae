use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use rollcall_core::AttendanceMark;

use crate::error::{ApiError, ApiJson, ApiQuery};
use crate::services::attendance::{self, AttendanceQuery};
use crate::state::AppState;

/// Upserts the record; repeated marks for the same day also answer 201.
pub async fn mark_attendance(
    State(state): State<AppState>,
    ApiJson(mark): ApiJson<AttendanceMark>,
) -> Result<impl IntoResponse, ApiError> {
    let record = attendance::mark(&state, mark).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_attendance(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AttendanceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(attendance::list(&state, query).await?))
}
