//! Core error types for the harness.

use std::path::Path;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Every crate-local error converts into this so the orchestrator can report
/// a single error type per case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// Path involved in the operation
        path: String,
        /// Underlying error message
        reason: String,
    },

    /// Structured log could not be parsed
    #[error("Parse error: {message}")]
    Parse {
        /// What went wrong
        message: String,
    },

    /// A case directory lacks one or more required artifacts
    #[error("Incomplete case {case}: missing {}", missing.join(", "))]
    MissingComponents {
        /// Case directory
        case: String,
        /// Names of the missing artifacts
        missing: Vec<String>,
    },

    /// The checker ran but left no result artifact behind
    #[error("No checker output found in {location}")]
    MissingOutput {
        /// Where the result was looked for
        location: String,
    },

    /// An external process could not be started or controlled
    #[error("Process error for {program}: {reason}")]
    Process {
        /// Program being supervised
        program: String,
        /// Underlying error message
        reason: String,
    },

    /// Timeout
    #[error("Timeout: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Field or component being validated
        field: String,
        /// Why validation failed
        reason: String,
    },

    /// Internal error (for unexpected errors)
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Build an [`CoreError::Io`] from a path and an I/O error
    #[must_use]
    pub fn io(path: impl AsRef<Path>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}
