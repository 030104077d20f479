//! Joint transform store abstraction.

use crate::types::JointId;
use nalgebra::UnitQuaternion;

/// Read/write access to joint local rotations (relative to the parent joint).
///
/// Unknown joints read as `None` and writes to them are ignored, so partial
/// rigs degrade to no-ops.
pub trait JointTransforms {
    /// Local rotation of `joint`.
    fn local_rotation(&self, joint: JointId) -> Option<UnitQuaternion<f64>>;

    /// Overwrites the local rotation of `joint`.
    fn set_local_rotation(&mut self, joint: JointId, rotation: UnitQuaternion<f64>);
}
