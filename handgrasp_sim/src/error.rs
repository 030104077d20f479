//! Error types for the simulation harness.

use handgrasp_core::ConfigError;
use handgrasp_env::EnvError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Scene or rig construction failed
    #[error("Scene setup failed: {0}")]
    Env(#[from] EnvError),

    /// Hand configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Export could not be serialized
    #[error("Failed to serialize export: {0}")]
    Json(#[from] serde_json::Error),

    /// Export could not be written
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Async runtime for realtime mode could not start
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
