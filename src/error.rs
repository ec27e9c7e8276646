//! Error types for Trueno-Track
//!
//! Errors raised by tracking clients propagate unchanged through the tracker.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Track error types
#[derive(Error, Debug)]
pub enum Error {
    /// No experiment with the given name or ID exists
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// The experiment exists but has been deleted
    #[error("Cannot set a deleted experiment '{0}' as the active experiment.\nRestore it or choose another study name.")]
    DeletedExperiment(String),

    /// A run ID was given that the backend does not know
    #[error("Run '{0}' not found")]
    RunNotFound(String),

    /// Tag value longer than the backend accepts
    #[error("Tag value for '{key}' is {len} characters, limit is {max}")]
    TagValueTooLong {
        /// Tag key
        key: String,
        /// Length of the rejected value
        len: usize,
        /// Backend limit
        max: usize,
    },

    /// Param value longer than the backend accepts
    #[error("Param value for '{key}' is {len} characters, limit is {max}")]
    ParamValueTooLong {
        /// Param key
        key: String,
        /// Length of the rejected value
        len: usize,
        /// Backend limit
        max: usize,
    },

    /// A param was logged again with a different value
    #[error("Changing param values is not allowed. Param '{key}' was already logged with value '{old}', new value '{new}'")]
    ParamConflict {
        /// Param key
        key: String,
        /// Previously logged value
        old: String,
        /// Rejected value
        new: String,
    },

    /// Tracking URI scheme is not supported
    #[error("Unsupported tracking URI: {0}\nUse 'memory:' or an http(s):// endpoint")]
    InvalidTrackingUri(String),

    /// Tracking server answered with a non-success status
    #[error("Tracking server returned HTTP {status} ({code}): {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Backend error code, e.g. `RESOURCE_DOES_NOT_EXIST`
        code: String,
        /// Error message from the response body
        message: String,
    },

    /// Tracking server could not be reached
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
