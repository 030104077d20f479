//! Error types for HandGrasp configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a `HandConfig`.
///
/// The per-frame runtime never fails; misconfiguration is only reported at
/// load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config JSON is malformed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an unusable value
    #[error("Invalid config field `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    /// Creates a validation error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
