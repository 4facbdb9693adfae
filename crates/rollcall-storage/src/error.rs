//! Storage error types for the document store abstraction layer.

use std::fmt;

/// Errors that can occur during document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested document was not found.
    #[error("Document not found: {collection}/{id}")]
    NotFound {
        /// The collection that was searched.
        collection: String,
        /// The id that was not found.
        id: String,
    },

    /// A document with the same unique key already exists.
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists {
        /// The collection holding the conflicting document.
        collection: String,
        /// The conflicting key.
        id: String,
    },

    /// The document or filter is malformed.
    #[error("Invalid document: {message}")]
    InvalidDocument {
        /// Description of why the document is invalid.
        message: String,
    },

    /// The backend could not be reached.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// The backend did not answer within the configured timeout.
    #[error("Storage operation timed out after {millis}ms")]
    Timeout {
        /// The timeout that elapsed.
        millis: u64,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a new `InvalidDocument` error.
    #[must_use]
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(millis: u64) -> Self {
        Self::Timeout { millis }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if the backend is unreachable or too slow.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ConnectionError { .. } | Self::Timeout { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::InvalidDocument { .. } => ErrorCategory::Validation,
            Self::ConnectionError { .. } | Self::Timeout { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Document not found.
    NotFound,
    /// Unique key conflict.
    Conflict,
    /// Validation error.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("students", "S1");
        assert_eq!(err.to_string(), "Document not found: students/S1");

        let err = StorageError::already_exists("students", "S1");
        assert_eq!(err.to_string(), "Document already exists: students/S1");

        let err = StorageError::timeout(250);
        assert_eq!(err.to_string(), "Storage operation timed out after 250ms");
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::not_found("students", "S1").is_not_found());
        assert!(StorageError::already_exists("students", "S1").is_already_exists());
        assert!(StorageError::connection_error("refused").is_unavailable());
        assert!(StorageError::timeout(10).is_unavailable());
        assert!(!StorageError::internal("boom").is_unavailable());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::timeout(1).category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            StorageError::already_exists("attendance", "S1/2024-01-01").category(),
            ErrorCategory::Conflict
        );
    }
}
