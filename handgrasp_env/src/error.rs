//! Error types for the HandGrasp environment abstraction.

use crate::types::{JointId, ShapeId};
use thiserror::Error;

/// Errors raised by environment implementations when they are being built or
/// mutated by a host (scene setup, rig setup).
///
/// The core itself never surfaces these: every runtime query in the core has a
/// defined fallback instead.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Shape is not registered with the geometry service
    #[error("Unknown shape: {0}")]
    UnknownShape(ShapeId),

    /// Joint is not registered with the transform store
    #[error("Unknown joint: {0}")]
    UnknownJoint(JointId),

    /// Shape parameters are unusable (negative radius, non-finite extents, ...)
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
}

impl EnvError {
    /// Creates an invalid shape error.
    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }
}
