//! Document store abstraction layer for Rollcall.
//!
//! This crate defines the [`DocumentStore`] trait implemented by the
//! in-memory and PostgreSQL backends, together with the filter, sort and
//! error types they share.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::DocumentStore;
pub use types::{
    Collection, Document, Filter, FindOptions, ID_FIELD, Sort, SortOrder, UpdateOutcome,
    from_document, to_document,
};

/// Type alias for a shareable store instance.
pub type DynDocumentStore = std::sync::Arc<dyn DocumentStore>;
