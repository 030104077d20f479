//! Grasp session state and the attach node it drives.

use handgrasp_env::{GrabbedObject, ShapeId};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Monotonic id of a grasp session, unique per driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "grasp#{}", self.0)
    }
}

/// World-space position and orientation of the attach point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttachFrame {
    pub position: Point3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl AttachFrame {
    pub fn new(position: Point3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Origin with no rotation.
    pub fn identity() -> Self {
        Self::new(Point3::origin(), UnitQuaternion::identity())
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self::new(Point3::from(iso.translation.vector), iso.rotation)
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position.coords), self.orientation)
    }

    /// True when no component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|v| v.is_finite())
            && self.orientation.coords.iter().all(|v| v.is_finite())
    }
}

impl Default for AttachFrame {
    fn default() -> Self {
        Self::identity()
    }
}

/// Short-lived state of one grasp, from grasp-begin to grasp-end.
#[derive(Debug, Clone)]
pub struct GraspSession {
    id: SessionId,
    object: GrabbedObject,
    contact_shape: Option<ShapeId>,
    frame: AttachFrame,
    started_at: Duration,
    solve_count: u32,
}

impl GraspSession {
    /// Creates a session with no contact shape and an identity frame.
    pub fn new(id: SessionId, object: GrabbedObject, started_at: Duration) -> Self {
        Self {
            id,
            object,
            contact_shape: None,
            frame: AttachFrame::identity(),
            started_at,
            solve_count: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The grabbed object.
    pub fn object(&self) -> &GrabbedObject {
        &self.object
    }

    /// Contact shape chosen for this grasp, if resolved.
    pub fn contact_shape(&self) -> Option<ShapeId> {
        self.contact_shape
    }

    /// Latest solved attach frame (world space).
    pub fn frame(&self) -> &AttachFrame {
        &self.frame
    }

    /// Clock time at grasp-begin.
    pub fn started_at(&self) -> Duration {
        self.started_at
    }

    /// How many times the solver has written this session's frame.
    pub fn solve_count(&self) -> u32 {
        self.solve_count
    }

    pub(crate) fn set_contact_shape(&mut self, shape: Option<ShapeId>) {
        self.contact_shape = shape;
    }

    pub(crate) fn record_solve(&mut self, frame: AttachFrame) {
        self.frame = frame;
        self.solve_count += 1;
    }
}

/// Dedicated child node of the manipulator that receives the attach pose.
///
/// Stores its pose relative to the manipulator so that it follows the hand
/// between solves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachNode {
    local: Isometry3<f64>,
}

impl AttachNode {
    pub fn new() -> Self {
        Self {
            local: Isometry3::identity(),
        }
    }

    /// Pose relative to the manipulator.
    pub fn local(&self) -> &Isometry3<f64> {
        &self.local
    }

    /// World pose given the manipulator's world pose.
    pub fn world(&self, manipulator: &Isometry3<f64>) -> Isometry3<f64> {
        manipulator * self.local
    }

    /// Places the node at a world-space frame.
    pub fn set_world(&mut self, manipulator: &Isometry3<f64>, frame: &AttachFrame) {
        self.local = manipulator.inverse() * frame.to_isometry();
    }

    /// Back to the manipulator origin with no rotation.
    pub fn reset(&mut self) {
        self.local = Isometry3::identity();
    }

    pub fn is_identity(&self) -> bool {
        self.local == Isometry3::identity()
    }
}

impl Default for AttachNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use handgrasp_env::ObjectId;
    use nalgebra::Vector3;

    #[test]
    fn test_attach_node_round_trip() {
        let manipulator = Isometry3::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.0, 0.7, 0.0));
        let frame = AttachFrame::new(
            Point3::new(1.1, 2.0, 3.05),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );

        let mut node = AttachNode::new();
        node.set_world(&manipulator, &frame);
        let world = node.world(&manipulator);

        assert_relative_eq!(world.translation.vector, frame.position.coords, epsilon = 1e-12);
        assert_relative_eq!(world.rotation.angle_to(&frame.orientation), 0.0, epsilon = 1e-9);
        assert!(!node.is_identity());

        node.reset();
        assert!(node.is_identity());
        assert_eq!(node.world(&manipulator), manipulator);
    }

    #[test]
    fn test_session_records_solves() {
        let object = GrabbedObject::new(ObjectId::from_seed(1), vec![ShapeId(4)]);
        let mut session = GraspSession::new(SessionId(0), object, Duration::from_millis(5));
        assert_eq!(session.solve_count(), 0);
        assert_eq!(*session.frame(), AttachFrame::identity());

        session.set_contact_shape(Some(ShapeId(4)));
        session.record_solve(AttachFrame::new(Point3::new(0.0, 1.0, 0.0), UnitQuaternion::identity()));

        assert_eq!(session.solve_count(), 1);
        assert_eq!(session.contact_shape(), Some(ShapeId(4)));
        assert_eq!(session.frame().position.y, 1.0);
    }

    #[test]
    fn test_frame_finiteness() {
        assert!(AttachFrame::identity().is_finite());
        let bad = AttachFrame::new(Point3::new(f64::NAN, 0.0, 0.0), UnitQuaternion::identity());
        assert!(!bad.is_finite());
    }
}
