//! Attendance marking (upsert per student and day) and listing.

use rollcall_core::{
    AttendanceMark, AttendanceRecord, AttendanceStatus, normalize_day, normalize_student_code,
};
use rollcall_storage::{
    Collection, Document, Filter, FindOptions, Sort, from_document,
};
use serde_json::Value;

use crate::cache::keys;
use crate::error::ApiError;
use crate::state::AppState;

/// Optional filters of an attendance listing. `student_id` is an alias of
/// `student_code`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AttendanceQuery {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub student_code: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Creates or replaces the record for (student, date). The student is not
/// required to exist.
pub async fn mark(state: &AppState, mark: AttendanceMark) -> Result<AttendanceRecord, ApiError> {
    let valid = mark.validate()?;

    let filter = Filter::new()
        .eq("student_id", valid.student_code.as_str())
        .eq("date", valid.date.as_str());
    let mut patch = Document::new();
    patch.insert("student_code".into(), Value::from(valid.student_code.as_str()));
    patch.insert("status".into(), Value::from(valid.status.as_str()));
    patch.insert("note".into(), valid.note.clone().map_or(Value::Null, Value::from));
    patch.insert(
        "recorded_by".into(),
        valid.recorded_by.clone().map_or(Value::Null, Value::from),
    );

    let doc = state
        .store
        .update(Collection::Attendance, &filter, patch, true)
        .await?
        .into_document()
        .ok_or_else(|| ApiError::internal("attendance upsert returned no document"))?;
    let record: AttendanceRecord = from_document(doc)?;

    state
        .invalidation
        .attendance_marked(&valid.student_code, &valid.date)
        .await;
    tracing::info!(
        student_code = %valid.student_code,
        date = %valid.date,
        status = %valid.status,
        "attendance marked"
    );

    if valid.status == AttendanceStatus::Absent {
        state
            .notifier
            .notify_absence(valid.student_code.clone(), valid.date.clone());
    }

    Ok(record)
}

/// Records matching the query, ordered by date ascending.
pub async fn list(state: &AppState, query: AttendanceQuery) -> Result<Vec<AttendanceRecord>, ApiError> {
    let date = non_blank(query.date.as_deref())
        .map(normalize_day)
        .transpose()?;
    let code = non_blank(query.student_code.as_deref())
        .or(non_blank(query.student_id.as_deref()))
        .map(normalize_student_code)
        .transpose()?;

    let cache = &state.cache;
    let key = keys::attendance_list(date.as_deref(), code.as_deref());
    cache
        .get_or_load(&key, cache.list_ttl(), || async {
            let filter = Filter::new()
                .eq_opt("date", date.as_deref())
                .eq_opt("student_id", code.as_deref());
            load(state, &filter, FindOptions::sorted(Sort::asc("date"))).await
        })
        .await
}

/// The `limit` most recent records, newest first.
pub async fn recent(state: &AppState, limit: usize) -> Result<Vec<AttendanceRecord>, ApiError> {
    load(
        state,
        &Filter::new(),
        FindOptions::sorted(Sort::desc("date")).with_limit(limit),
    )
    .await
}

/// Records for one day, straight from the store.
pub async fn for_day(state: &AppState, date: &str) -> Result<Vec<AttendanceRecord>, ApiError> {
    load(
        state,
        &Filter::new().eq("date", date),
        FindOptions::sorted(Sort::asc("student_code")),
    )
    .await
}

async fn load(
    state: &AppState,
    filter: &Filter,
    options: FindOptions,
) -> Result<Vec<AttendanceRecord>, ApiError> {
    let docs = state
        .store
        .find_many(Collection::Attendance, filter, &options)
        .await?;
    docs.into_iter()
        .map(|doc| from_document(doc).map_err(ApiError::from))
        .collect()
}
