//! Errors raised while reading result logs.

use regress_core::CoreError;

/// Structured log parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// File could not be read
    #[error("cannot read {path}: {reason}")]
    Io {
        /// Path being read
        path: String,
        /// Underlying error message
        reason: String,
    },

    /// Text between or inside objects defeats boundary detection
    #[error("malformed log at byte {offset}: {reason}")]
    Malformed {
        /// Byte offset of the offending character
        offset: usize,
        /// What was found
        reason: String,
    },

    /// A top-level object has no `invariant` key
    #[error("object {index} has no 'invariant' field")]
    MissingInvariantKey {
        /// Position of the object in the log
        index: usize,
    },

    /// Repaired text is still not valid JSON, or a record has the wrong shape
    #[error("decode failed{}: {reason}", index.map(|i| format!(" for object {}", i)).unwrap_or_default())]
    Decode {
        /// Position of the object in the log, if known
        index: Option<usize>,
        /// Decoder message
        reason: String,
    },
}

impl From<ParseError> for CoreError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io { path, reason } => CoreError::Io { path, reason },
            other => CoreError::Parse {
                message: other.to_string(),
            },
        }
    }
}
