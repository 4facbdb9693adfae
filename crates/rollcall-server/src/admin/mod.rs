//! Admin web pages: login, dashboard, student table, bulk attendance
//! marking and reports.

pub mod auth;
pub mod views;

use axum::{
    Form, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use rollcall_core::{AttendanceMark, AttendanceStatus};
use rollcall_storage::{Collection, Filter};
use serde::Deserialize;

use crate::error::ApiError;
use crate::services::{attendance, students};
use crate::state::AppState;

pub use auth::AdminSession;
use auth::found;
use views::DashboardStats;

const RECENT_ATTENDANCE_LIMIT: usize = 50;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/login", get(login_form).post(login))
        .route("/admin/logout", post(logout))
        .route("/admin/students", get(students_page))
        .route("/admin/attendance", get(attendance_page))
        .route("/admin/attendance/mark", post(bulk_mark))
        .route("/admin/stats", get(reports_page))
}

/// Admin pages render failures as plain HTML rather than JSON.
struct PageError(ApiError);

impl From<ApiError> for PageError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "admin page failed");
        }
        let body = format!(
            "<!DOCTYPE html><html><body><h1>{}</h1><p>{}</p></body></html>",
            status.as_u16(),
            views::html_escape(&self.0.to_string())
        );
        (status, Html(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    api_key: String,
}

async fn login_form(State(state): State<AppState>) -> Html<String> {
    Html(views::render_login(&state.config.app.name, None))
}

async fn login(State(state): State<AppState>, jar: CookieJar, Form(form): Form<LoginForm>) -> Response {
    if form.api_key != state.config.admin.api_key {
        tracing::warn!("admin login rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Html(views::render_login(&state.config.app.name, Some("Invalid API key"))),
        )
            .into_response();
    }
    let cookie = auth::login_cookie(&form.api_key, state.config.admin.cookie_max_age_secs);
    tracing::info!("admin logged in");
    (jar.add(cookie), found("/admin")).into_response()
}

async fn logout(jar: CookieJar) -> Response {
    (jar.remove(auth::logout_cookie()), found(auth::LOGIN_PATH)).into_response()
}

async fn dashboard(
    _session: AdminSession,
    State(state): State<AppState>,
) -> Result<Html<String>, PageError> {
    let today = rollcall_core::today();
    let by_status = |status: AttendanceStatus| {
        Filter::new()
            .eq("date", today.as_str())
            .eq("status", status.as_str())
    };

    let total_students = students::count(&state).await?;
    let today_attendance = count_attendance(&state, Filter::new().eq("date", today.as_str())).await?;
    let present_count = count_attendance(&state, by_status(AttendanceStatus::Present)).await?;
    let absent_count = count_attendance(&state, by_status(AttendanceStatus::Absent)).await?;
    let late_count = count_attendance(&state, by_status(AttendanceStatus::Late)).await?;

    let stats = DashboardStats {
        total_students,
        today_attendance,
        present_count,
        absent_count,
        late_count,
        attendance_rate: DashboardStats::rate(present_count, total_students),
    };
    Ok(Html(views::render_dashboard(
        &state.config.app.name,
        &today,
        &stats,
    )))
}

async fn count_attendance(state: &AppState, filter: Filter) -> Result<u64, ApiError> {
    Ok(state.store.count(Collection::Attendance, &filter).await?)
}

async fn students_page(
    _session: AdminSession,
    State(state): State<AppState>,
) -> Result<Html<String>, PageError> {
    let list = students::list(&state).await?;
    Ok(Html(views::render_students(&state.config.app.name, &list)))
}

#[derive(Debug, Default, Deserialize)]
struct AttendancePageQuery {
    #[serde(default)]
    success: Option<String>,
}

async fn attendance_page(
    _session: AdminSession,
    State(state): State<AppState>,
    Query(query): Query<AttendancePageQuery>,
) -> Result<Html<String>, PageError> {
    let today = rollcall_core::today();
    let list = students::list(&state).await?;
    let marked = attendance::for_day(&state, &today).await?;
    let success = query.success.as_deref() == Some("true");
    Ok(Html(views::render_attendance_form(
        &state.config.app.name,
        &today,
        &list,
        &marked,
        success,
    )))
}

/// Marks every `status_<code>` field of the form for the submitted date.
/// Rows that fail validation are skipped and logged.
async fn bulk_mark(
    _session: AdminSession,
    State(state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, PageError> {
    let date = fields
        .iter()
        .find(|(k, _)| k == "date")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();

    let mut marked = 0usize;
    let mut skipped = 0usize;
    for (field, value) in &fields {
        let Some(code) = field.strip_prefix("status_") else {
            continue;
        };
        let status = match value.parse::<AttendanceStatus>() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(student_code = %code, error = %e, "skipping admin mark");
                skipped += 1;
                continue;
            }
        };
        let mark = AttendanceMark {
            student_id: Some(code.to_string()),
            student_code: Some(code.to_string()),
            date: date.clone(),
            status,
            note: None,
            recorded_by: None,
        };
        match attendance::mark(&state, mark).await {
            Ok(_) => marked += 1,
            Err(ApiError::Validation(msg) | ApiError::BadRequest(msg)) => {
                tracing::warn!(student_code = %code, error = %msg, "skipping admin mark");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(date = %date, marked, skipped, "admin bulk attendance saved");
    Ok(found("/admin/attendance?success=true"))
}

async fn reports_page(
    _session: AdminSession,
    State(state): State<AppState>,
) -> Result<Html<String>, PageError> {
    let today = rollcall_core::today();
    let total_students = students::count(&state).await?;
    let recent = attendance::recent(&state, RECENT_ATTENDANCE_LIMIT).await?;
    Ok(Html(views::render_reports(
        &state.config.app.name,
        &today,
        total_students,
        &recent,
    )))
}
