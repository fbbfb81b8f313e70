//! Custom error types and handling
//!
//! Every stage of the pipeline reports failures through [`AppError`]. The
//! orchestrator turns an error into a failure record for the unit of work it
//! belongs to, so the category returned by [`AppError::error_code`] ends up
//! in the persisted failure table.

use crate::config::ConfigError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Extraction errors
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Format error: {0}")]
    Format(String),

    // Generation errors
    #[error("Template error: {0}")]
    Template(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    // External tool errors
    #[error("Build error: {0}")]
    Build(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    // I/O and serialization
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "PARSE_ERROR",
            Self::Format(_) => "FORMAT_ERROR",
            Self::Template(_) => "TEMPLATE_ERROR",
            Self::Manifest(_) => "MANIFEST_ERROR",
            Self::Build(_) => "BUILD_ERROR",
            Self::Execution(_) => "EXECUTION_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled(_) => "CANCELLED",
            Self::Io(_) => "IO_ERROR",
            Self::Csv(_) => "CSV_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the error came from an external cancellation request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
