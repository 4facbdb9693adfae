//! Student CRUD with read-through caching and write invalidation.

use rollcall_core::{Student, StudentInput, StudentPatch, normalize_student_code};
use rollcall_storage::{
    Collection, DynDocumentStore, Filter, FindOptions, Sort, StorageError, UpdateOutcome,
    from_document, to_document,
};

use crate::cache::{ReadThroughCache, keys};
use crate::error::ApiError;
use crate::state::AppState;

fn not_found() -> ApiError {
    ApiError::not_found("Student not found")
}

/// Path codes that cannot be valid codes can never match a stored student.
fn path_code(raw: &str) -> Result<String, ApiError> {
    normalize_student_code(raw).map_err(|_| not_found())
}

/// Reads one student through the cache.
pub async fn find_cached(
    cache: &ReadThroughCache,
    store: &DynDocumentStore,
    code: &str,
) -> Result<Student, ApiError> {
    cache
        .get_or_load(&keys::student(code), cache.entity_ttl(), || async {
            let doc = store
                .find_one(Collection::Students, &Filter::by_id(code))
                .await?
                .ok_or_else(not_found)?;
            Ok::<_, ApiError>(from_document(doc)?)
        })
        .await
}

pub async fn create(state: &AppState, input: StudentInput) -> Result<Student, ApiError> {
    let student = input.validate()?.into_student();
    let doc = to_document(&student)?;

    match state.store.insert(Collection::Students, doc).await {
        Ok(_) => {}
        Err(StorageError::AlreadyExists { .. }) => {
            return Err(ApiError::conflict(format!(
                "Student with code {} already exists",
                student.student_code
            )));
        }
        Err(e) => return Err(e.into()),
    }

    state.invalidation.student_changed(&student.student_code).await;
    tracing::info!(student_code = %student.student_code, "student created");
    Ok(student)
}

/// All students ordered by last name.
pub async fn list(state: &AppState) -> Result<Vec<Student>, ApiError> {
    let cache = &state.cache;
    cache
        .get_or_load(keys::STUDENTS_LIST, cache.list_ttl(), || async {
            let docs = state
                .store
                .find_many(
                    Collection::Students,
                    &Filter::new(),
                    &FindOptions::sorted(Sort::asc("last_name")),
                )
                .await?;
            docs.into_iter()
                .map(|doc| from_document(doc).map_err(ApiError::from))
                .collect::<Result<Vec<Student>, ApiError>>()
        })
        .await
}

pub async fn get(state: &AppState, raw_code: &str) -> Result<Student, ApiError> {
    let code = path_code(raw_code)?;
    find_cached(&state.cache, &state.store, &code).await
}

/// Applies the provided fields. An empty patch returns the current record.
pub async fn update(
    state: &AppState,
    raw_code: &str,
    patch: StudentPatch,
) -> Result<Student, ApiError> {
    let code = path_code(raw_code)?;
    let patch = patch.validate(&code)?;
    if patch.is_empty() {
        return find_cached(&state.cache, &state.store, &code).await;
    }

    let outcome = state
        .store
        .update(
            Collection::Students,
            &Filter::by_id(code.as_str()),
            to_document(&patch)?,
            false,
        )
        .await?;
    let student: Student = match outcome {
        UpdateOutcome::Updated(doc) | UpdateOutcome::Inserted(doc) => from_document(doc)?,
        UpdateOutcome::NotFound => return Err(not_found()),
    };

    state.invalidation.student_changed(&code).await;
    tracing::info!(student_code = %code, "student updated");
    Ok(student)
}

pub async fn delete(state: &AppState, raw_code: &str) -> Result<(), ApiError> {
    let code = path_code(raw_code)?;
    let removed = state
        .store
        .delete(Collection::Students, &Filter::by_id(code.as_str()))
        .await?;
    if removed == 0 {
        return Err(not_found());
    }

    state.invalidation.student_deleted(&code).await;
    tracing::info!(student_code = %code, "student deleted");
    Ok(())
}

pub async fn count(state: &AppState) -> Result<u64, ApiError> {
    Ok(state
        .store
        .count(Collection::Students, &Filter::new())
        .await?)
}
