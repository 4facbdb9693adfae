//! The document store trait that every backend implements.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{Collection, Document, Filter, FindOptions, UpdateOutcome};

/// A minimal document store over the `students` and `attendance`
/// collections.
///
/// Backends only need per-document atomicity: each call is independent and
/// no multi-document transactions are assumed. Implementations must be
/// thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use rollcall_storage::{Collection, DocumentStore, Filter};
///
/// async fn exists(store: &dyn DocumentStore, code: &str) -> Result<bool, StorageError> {
///     Ok(store
///         .find_one(Collection::Students, &Filter::by_id(code))
///         .await?
///         .is_some())
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the first document matching `filter`, or `None`.
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StorageError>;

    /// Returns every document matching `filter`, sorted and truncated per
    /// `options`.
    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StorageError>;

    /// Inserts a new document. The document must carry `_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the collection's unique key
    /// is already taken.
    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StorageError>;

    /// Merges `patch` into the first document matching `filter`.
    ///
    /// With `upsert`, a missing document is created from the filter's fields
    /// plus the patch, with a generated `_id` unless the filter pins one.
    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, StorageError>;

    /// Deletes every document matching `filter` and returns how many were removed.
    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StorageError>;

    /// Counts the documents matching `filter`.
    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StorageError>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Releases backend resources. Called once on shutdown.
    async fn close(&self) {}

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
