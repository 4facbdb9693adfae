use thiserror::Error;

/// Core error types for Rollcall domain validation
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("student_code is required")]
    MissingStudentCode,

    #[error("date must be in YYYY-MM-DD format: {0}")]
    InvalidDate(String),
}

impl CoreError {
    /// Create a new Validation error for a named field
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a new InvalidDate error
    pub fn invalid_date(value: impl Into<String>) -> Self {
        Self::InvalidDate(value.into())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
