//! Error types for clipping and export operations
//!
//! Only the export step can fail in a way the caller sees. Templating,
//! rendering and filename sanitization are total: malformed input degrades to
//! a best-effort result instead of an error. Invalid stored options are
//! described by [`ValidationError`], logged, and replaced by defaults.

use thiserror::Error;

/// Failure reported by the host download capability for a single resource
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    /// The host rejected or failed the download request
    #[error("host download failed: {0}")]
    Host(String),

    /// The selected download capability is not provided by the host
    #[error("download capability unavailable: {0}")]
    Unavailable(String),

    /// The host accepted the request but the transfer did not complete
    #[error("download interrupted: {0}")]
    Interrupted(String),
}

impl ExportError {
    /// Short machine-readable kind, stable across releases
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::Host(_) => "host",
            ExportError::Unavailable(_) => "unavailable",
            ExportError::Interrupted(_) => "interrupted",
        }
    }
}

/// An option value loaded from the store that could not be used
///
/// Never surfaced to callers as a failure: the loader logs it and substitutes
/// the documented default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Value present but of the wrong type
    #[error("option `{key}` has an invalid value: {reason}")]
    InvalidValue {
        /// Store key, in its camelCase form
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Required value absent or empty
    #[error("option `{key}` is missing or empty")]
    Missing {
        /// Store key, in its camelCase form
        key: String,
    },
}
