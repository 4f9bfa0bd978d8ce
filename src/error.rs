//! Error types for the fintrack agent service

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, FintrackError>;

#[derive(Error, Debug)]
pub enum FintrackError {

    // =============================
    // Domain Errors
    // =============================

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // =============================
    // Agent Pipeline Errors
    // =============================

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Max agent iterations exceeded: {0}")]
    MaxIterationsExceeded(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    // =============================
    // Infrastructure Errors
    // =============================

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FintrackError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Errors a tool reports back to the model as text instead of aborting the turn.
    pub fn is_recoverable_in_tool(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Validation(_)
                | Self::Unauthorized(_)
                | Self::InvalidToolInput(_)
        )
    }
}

impl From<sqlx::Error> for FintrackError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return Self::Validation(format!("Unique constraint violated: {}", db_err));
            }
        }
        Self::DatabaseError(e.to_string())
    }
}
