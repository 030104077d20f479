//! Grasp attachment solver.
//!
//! Computes where the grabbed object's pivot should sit relative to the
//! manipulator: on the object's surface between the index and thumb tips,
//! pushed out along the estimated normal by a small standoff, and oriented so
//! that the pinch axis lies in the frame's XY plane.
//!
//! Every input may be degenerate (missing tips, objects without shapes,
//! rays that miss, pinch axes parallel to the manipulator's up). Each case
//! has a fixed fallback, and the solver always returns a finite frame.

use crate::config::GraspConfig;
use crate::session::{AttachFrame, GraspSession};
use handgrasp_env::{GeometryQuery, GrabbedObject, ShapeId};
use nalgebra::{Isometry3, Point3, Unit, UnitQuaternion, Vector3};
use serde::Serialize;
use tracing::{debug, trace};

/// Below this squared length the `up x pinch` forward vector is unusable.
const FORWARD_EPSILON_SQ: f64 = 1e-4;

/// Index and thumb fingertip positions in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FingertipPair {
    pub index: Option<Point3<f64>>,
    pub thumb: Option<Point3<f64>>,
}

impl FingertipPair {
    pub fn new(index: Point3<f64>, thumb: Point3<f64>) -> Self {
        Self {
            index: Some(index),
            thumb: Some(thumb),
        }
    }

    /// No fingertips tracked.
    pub fn missing() -> Self {
        Self::default()
    }

    /// Tip separation, if both tips are tracked.
    pub fn distance(&self) -> Option<f64> {
        match (self.index, self.thumb) {
            (Some(i), Some(t)) => Some(nalgebra::distance(&i, &t)),
            _ => None,
        }
    }

    /// Both tips, substituting `fallback` for any that are missing.
    pub fn resolve(&self, fallback: Point3<f64>) -> (Point3<f64>, Point3<f64>) {
        (self.index.unwrap_or(fallback), self.thumb.unwrap_or(fallback))
    }
}

/// World pose of the hand or controller doing the grabbing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Manipulator {
    pub pose: Isometry3<f64>,
}

impl Manipulator {
    pub fn new(pose: Isometry3<f64>) -> Self {
        Self { pose }
    }

    pub fn origin(&self) -> Point3<f64> {
        Point3::from(self.pose.translation.vector)
    }

    /// Manipulator +Y in world space.
    pub fn up(&self) -> Vector3<f64> {
        self.pose.rotation * Vector3::y()
    }

    /// Manipulator +Z in world space.
    pub fn forward(&self) -> Vector3<f64> {
        self.pose.rotation * Vector3::z()
    }
}

impl Default for Manipulator {
    fn default() -> Self {
        Self::new(Isometry3::identity())
    }
}

/// Where the surface normal of a solve came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalSource {
    /// Ray from the pinch midpoint hit the contact shape
    Raycast,
    /// Direction from the shape's bounds centre to the contact
    BoundsCenter,
    /// Direction from the pinch midpoint to the contact (no shape)
    PinchAxis,
}

/// Result of a solve, with the diagnostics that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOutcome {
    pub frame: AttachFrame,
    pub contact: Point3<f64>,

    /// Unit normal, or zero when every estimate was degenerate
    pub normal: Vector3<f64>,
    pub normal_source: NormalSource,
    pub contact_shape: Option<ShapeId>,

    /// Orientation used the manipulator forward instead of `up x pinch`
    pub forward_fallback: bool,
}

/// Contact point and surface normal estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceEstimate {
    pub contact: Point3<f64>,
    pub normal: Vector3<f64>,
    pub source: NormalSource,
}

/// Stateless solver; all per-grasp state lives in `GraspSession`.
#[derive(Debug, Clone)]
pub struct GraspAttachmentSolver {
    config: GraspConfig,
}

impl GraspAttachmentSolver {
    pub fn new(config: GraspConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GraspConfig {
        &self.config
    }

    /// Solves the attach frame and stores it in the session.
    ///
    /// Selects a contact shape first when the session has none.
    pub fn solve(
        &self,
        session: &mut GraspSession,
        tips: &FingertipPair,
        manipulator: &Manipulator,
        geometry: &dyn GeometryQuery,
    ) -> SolveOutcome {
        if tips.index.is_none() || tips.thumb.is_none() {
            debug!(session = %session.id(), "fingertip missing, using manipulator origin");
        }
        let (index, thumb) = tips.resolve(manipulator.origin());
        let mid = nalgebra::center(&index, &thumb);

        if session.contact_shape().is_none() {
            let shape = self.select_contact_shape(session.object(), &mid, geometry);
            session.set_contact_shape(shape);
        }
        let contact_shape = session.contact_shape();

        let surface = self.estimate_surface(contact_shape, &mid, geometry);
        let position = surface.contact + surface.normal * self.config.surface_offset;
        let (orientation, forward_fallback) = attach_orientation(&index, &thumb, manipulator);

        let frame = AttachFrame::new(position, orientation);
        session.record_solve(frame);

        trace!(
            session = %session.id(),
            shape = ?contact_shape,
            normal_source = ?surface.source,
            forward_fallback,
            "attach frame solved"
        );

        SolveOutcome {
            frame,
            contact: surface.contact,
            normal: surface.normal,
            normal_source: surface.source,
            contact_shape,
            forward_fallback,
        }
    }

    /// Nearest enabled shape of `object` to `mid`, by squared distance to
    /// its closest point. Ties keep the first shape in object order.
    pub fn select_contact_shape(
        &self,
        object: &GrabbedObject,
        mid: &Point3<f64>,
        geometry: &dyn GeometryQuery,
    ) -> Option<ShapeId> {
        let mut best: Option<(ShapeId, f64)> = None;

        for &shape in &object.shapes {
            if !geometry.is_enabled(shape) {
                continue;
            }
            let Some(closest) = geometry.closest_point(shape, mid) else {
                continue;
            };
            let dist_sq = (closest - mid).norm_squared();
            if best.map_or(true, |(_, d)| dist_sq < d) {
                best = Some((shape, dist_sq));
            }
        }

        if best.is_none() {
            debug!(object = %object.id, "no enabled shape, contact falls back to pinch midpoint");
        }
        best.map(|(shape, _)| shape)
    }

    /// Contact point on `shape` and the surface normal there.
    pub fn estimate_surface(
        &self,
        shape: Option<ShapeId>,
        mid: &Point3<f64>,
        geometry: &dyn GeometryQuery,
    ) -> SurfaceEstimate {
        let Some(shape) = shape else {
            return SurfaceEstimate {
                contact: *mid,
                normal: Vector3::zeros(),
                source: NormalSource::PinchAxis,
            };
        };

        let contact = geometry.closest_point(shape, mid).unwrap_or(*mid);

        if let Some(direction) = Unit::try_new(contact - mid, f64::EPSILON) {
            let hit = geometry.raycast(
                mid,
                &direction,
                self.config.raycast_max_distance,
                self.config.grabbable_mask,
            );
            if let Some(hit) = hit.filter(|h| h.shape == shape) {
                return SurfaceEstimate {
                    contact: hit.point,
                    normal: normalize_or_zero(hit.normal),
                    source: NormalSource::Raycast,
                };
            }
        }

        let normal = geometry
            .bounds_center(shape)
            .map(|center| normalize_or_zero(contact - center))
            .unwrap_or_else(Vector3::zeros);
        debug!(%shape, "raycast missed contact shape, using bounds-centre normal");

        SurfaceEstimate {
            contact,
            normal,
            source: NormalSource::BoundsCenter,
        }
    }
}

/// Look rotation along `up x pinch_dir`, with the manipulator's up as the
/// up reference. Returns the rotation and whether the forward fallback fired.
pub fn attach_orientation(
    index: &Point3<f64>,
    thumb: &Point3<f64>,
    manipulator: &Manipulator,
) -> (UnitQuaternion<f64>, bool) {
    let up = manipulator.up();
    let pinch_dir = normalize_or_zero(index - thumb);
    let forward = up.cross(&pinch_dir);

    if forward.norm_squared() < FORWARD_EPSILON_SQ {
        // Manipulator forward is orthogonal to its up by construction.
        return (UnitQuaternion::face_towards(&manipulator.forward(), &up), true);
    }
    (UnitQuaternion::face_towards(&forward, &up), false)
}

fn normalize_or_zero(v: Vector3<f64>) -> Vector3<f64> {
    v.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use crate::test_support::SphereScene;
    use approx::assert_relative_eq;
    use handgrasp_env::{LayerMask, ObjectId};
    use std::time::Duration;

    fn session_for(shapes: Vec<ShapeId>) -> GraspSession {
        let object = GrabbedObject::new(ObjectId::from_seed(7), shapes);
        GraspSession::new(SessionId(1), object, Duration::ZERO)
    }

    fn solver() -> GraspAttachmentSolver {
        GraspAttachmentSolver::new(GraspConfig::default())
    }

    #[test]
    fn test_raycast_hit_sets_position() {
        let mut scene = SphereScene::new();
        let ball = scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1);
        let mut session = session_for(vec![ball]);

        // Pinch just outside the sphere's -Z side.
        let tips = FingertipPair::new(Point3::new(0.02, 0.0, 0.35), Point3::new(-0.02, 0.0, 0.35));
        let outcome = solver().solve(&mut session, &tips, &Manipulator::default(), &scene);

        assert_eq!(outcome.normal_source, NormalSource::Raycast);
        assert_eq!(outcome.contact_shape, Some(ball));
        assert_relative_eq!(outcome.contact, Point3::new(0.0, 0.0, 0.4), epsilon = 1e-9);
        assert_relative_eq!(outcome.normal, -Vector3::z(), epsilon = 1e-9);

        let expected = outcome.contact + outcome.normal * 0.006;
        assert_relative_eq!(outcome.frame.position, expected, epsilon = 1e-12);
        assert_eq!(session.frame(), &outcome.frame);
        assert_eq!(session.solve_count(), 1);
    }

    #[test]
    fn test_orientation_looks_along_up_cross_pinch() {
        let mut scene = SphereScene::new();
        let ball = scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1);
        let mut session = session_for(vec![ball]);

        // Pinch axis along +X, up is +Y, so forward is +Y x +X = -Z.
        let tips = FingertipPair::new(Point3::new(0.02, 0.0, 0.35), Point3::new(-0.02, 0.0, 0.35));
        let outcome = solver().solve(&mut session, &tips, &Manipulator::default(), &scene);

        assert!(!outcome.forward_fallback);
        let z = outcome.frame.orientation * Vector3::z();
        let y = outcome.frame.orientation * Vector3::y();
        assert_relative_eq!(z, -Vector3::z(), epsilon = 1e-9);
        assert_relative_eq!(y, Vector3::y(), epsilon = 1e-9);
    }

    #[test]
    fn test_no_shapes_with_parallel_pinch_axis() {
        let scene = SphereScene::new();
        let mut session = session_for(Vec::new());

        // Pinch direction is exactly the manipulator's up.
        let tips = FingertipPair::new(Point3::new(0.0, 0.1, 0.0), Point3::new(0.0, 0.0, 0.0));
        let outcome = solver().solve(&mut session, &tips, &Manipulator::default(), &scene);

        let mid = Point3::new(0.0, 0.05, 0.0);
        assert_eq!(outcome.contact_shape, None);
        assert_eq!(outcome.normal_source, NormalSource::PinchAxis);
        assert_eq!(outcome.contact, mid);
        assert_eq!(outcome.frame.position, mid);
        assert!(outcome.forward_fallback);
        assert!(outcome.frame.is_finite());
        assert_relative_eq!(outcome.frame.orientation * Vector3::z(), Vector3::z(), epsilon = 1e-9);
    }

    #[test]
    fn test_missing_tips_use_manipulator_origin() {
        let scene = SphereScene::new();
        let mut session = session_for(Vec::new());
        let manipulator = Manipulator::new(Isometry3::translation(0.3, 1.2, -0.4));

        let outcome = solver().solve(&mut session, &FingertipPair::missing(), &manipulator, &scene);

        assert_eq!(outcome.contact, manipulator.origin());
        assert!(outcome.forward_fallback);
        assert!(outcome.frame.is_finite());
    }

    #[test]
    fn test_masked_ray_falls_back_to_bounds_center() {
        let mut scene = SphereScene::new();
        let ball = scene.add_sphere_on_layer(Point3::new(0.0, 0.0, 0.5), 0.1, 3);
        let mut session = session_for(vec![ball]);

        let mut config = GraspConfig::default();
        config.grabbable_mask = LayerMask::layer(1);
        let solver = GraspAttachmentSolver::new(config);

        let tips = FingertipPair::new(Point3::new(0.02, 0.0, 0.35), Point3::new(-0.02, 0.0, 0.35));
        let outcome = solver.solve(&mut session, &tips, &Manipulator::default(), &scene);

        assert_eq!(outcome.normal_source, NormalSource::BoundsCenter);
        assert_relative_eq!(outcome.contact, Point3::new(0.0, 0.0, 0.4), epsilon = 1e-9);
        assert_relative_eq!(outcome.normal, -Vector3::z(), epsilon = 1e-9);
    }

    #[test]
    fn test_midpoint_inside_shape_has_no_ray() {
        let mut scene = SphereScene::new();
        let ball = scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1);
        let mut session = session_for(vec![ball]);

        // Midpoint at the sphere centre: contact == mid == bounds centre.
        let tips = FingertipPair::new(Point3::new(0.01, 0.0, 0.5), Point3::new(-0.01, 0.0, 0.5));
        let outcome = solver().solve(&mut session, &tips, &Manipulator::default(), &scene);

        assert_eq!(outcome.normal_source, NormalSource::BoundsCenter);
        assert_eq!(outcome.normal, Vector3::zeros());
        assert_eq!(outcome.frame.position, Point3::new(0.0, 0.0, 0.5));
    }

    #[test]
    fn test_selection_skips_disabled_and_prefers_nearest() {
        let mut scene = SphereScene::new();
        let near = scene.add_sphere(Point3::new(0.0, 0.0, 0.3), 0.05);
        let far = scene.add_sphere(Point3::new(0.0, 0.0, 1.0), 0.05);
        let object = GrabbedObject::new(ObjectId::from_seed(2), vec![far, near]);
        let mid = Point3::origin();

        assert_eq!(solver().select_contact_shape(&object, &mid, &scene), Some(near));

        scene.set_enabled(near, false);
        assert_eq!(solver().select_contact_shape(&object, &mid, &scene), Some(far));

        scene.set_enabled(far, false);
        assert_eq!(solver().select_contact_shape(&object, &mid, &scene), None);
    }

    #[test]
    fn test_existing_contact_shape_is_kept() {
        let mut scene = SphereScene::new();
        let a = scene.add_sphere(Point3::new(0.0, 0.0, 0.3), 0.05);
        let b = scene.add_sphere(Point3::new(0.0, 0.0, 1.0), 0.05);
        let mut session = session_for(vec![a, b]);
        session.set_contact_shape(Some(b));

        let tips = FingertipPair::new(Point3::new(0.01, 0.0, 0.0), Point3::new(-0.01, 0.0, 0.0));
        let outcome = solver().solve(&mut session, &tips, &Manipulator::default(), &scene);
        assert_eq!(outcome.contact_shape, Some(b));
    }
}
