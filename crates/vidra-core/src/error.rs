//! Error types module
//!
//! All domain errors are unified under the [`AppError`] enum: validation,
//! lookup, authorization, processing, storage, and configuration failures.
//! Authorization denials carry a human-readable, user-safe reason; internal
//! errors map to a generic client message at the API boundary.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed create/upload request; rejected immediately, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown video or job id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access control denial. The message is the user-safe reason.
    #[error("Access denied: {0}")]
    Authorization(String),

    /// Metadata/transcode/manifest failure; retryable up to the job's
    /// attempt ceiling, then terminal.
    #[error("Processing error: {0}")]
    Processing(String),

    /// Object store or CDN failure; retried with backoff.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Missing signing key, DRM config, or CDN domain when required. Fatal,
    /// surfaced at the operation boundary, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code for logging and API mapping.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Authorization(_) => "AUTHORIZATION_ERROR",
            AppError::Processing(_) => "PROCESSING_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Processing(_) | AppError::Storage(_))
    }

    /// Client-facing message. Never exposes internal state; authorization
    /// reasons and validation messages pass through unchanged.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Authorization(msg) => msg.clone(),
            AppError::Processing(_) => "Video processing failed".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::Configuration(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("UUID parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation error: {}", err))
    }
}
