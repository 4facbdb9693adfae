use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rollcall_core::{StudentInput, StudentPatch};

use crate::error::{ApiError, ApiJson};
use crate::services::students;
use crate::state::AppState;

pub async fn create_student(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<StudentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let student = students::create(&state, input).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn list_students(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(students::list(&state).await?))
}

pub async fn get_student(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(students::get(&state, &code).await?))
}

pub async fn update_student(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ApiJson(patch): ApiJson<StudentPatch>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(students::update(&state, &code, patch).await?))
}

pub async fn delete_student(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    students::delete(&state, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}
