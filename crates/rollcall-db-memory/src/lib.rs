//! In-memory document store backend for Rollcall.
//!
//! This crate provides an in-memory implementation of the `DocumentStore`
//! trait from `rollcall-storage`. It is the default backend for local
//! development and the backend used by the server's integration tests.
//!
//! # Example
//!
//! ```ignore
//! use rollcall_db_memory::InMemoryStore;
//! use rollcall_storage::{Collection, DocumentStore, Filter};
//!
//! let store = InMemoryStore::new();
//! let doc = serde_json::json!({"_id": "S1", "first_name": "Ada"});
//! store.insert(Collection::Students, doc.as_object().cloned().unwrap()).await?;
//! ```

pub mod storage;

pub use rollcall_storage::{DocumentStore, StorageError};
pub use storage::InMemoryStore;

/// Creates a new shareable in-memory store.
pub fn create_memory_store() -> rollcall_storage::DynDocumentStore {
    std::sync::Arc::new(InMemoryStore::new())
}
