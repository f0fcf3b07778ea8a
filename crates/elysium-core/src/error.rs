//! Error types for the Elysium core library.

use thiserror::Error;

/// Core error type for the Elysium platform.
#[derive(Error, Debug)]
pub enum ElysiumError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid ID: {0}")]
    InvalidId(#[from] ulid::DecodeError),

    #[error("Date parsing error in {field}: {message}")]
    DateParse {
        field: &'static str,
        message: String,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("VCS provider returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("VCS provider request failed: {0}")]
    ProviderRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ElysiumError {
    /// True for authorization denials, which async handlers log at info
    /// rather than error.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ElysiumError::Forbidden(_))
    }
}

/// Result type alias for Elysium operations.
pub type Result<T> = std::result::Result<T, ElysiumError>;
