//! Geometry / collision service abstraction.

use crate::types::{LayerMask, ShapeId};
use nalgebra::{Point3, Unit, Vector3};

/// Result of a successful ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Shape that was hit first along the ray
    pub shape: ShapeId,

    /// World-space hit point
    pub point: Point3<f64>,

    /// Outward surface normal at the hit point (unit length)
    pub normal: Vector3<f64>,

    /// Distance from the ray origin to the hit point
    pub distance: f64,
}

/// Closest-point and ray-intersection primitives consumed by the grasp solver.
///
/// All queries are synchronous. Implementations decide how shapes are stored;
/// the core only ever refers to them through `ShapeId`.
///
/// # Implementations
///
/// - **Engine**: wraps the host physics scene
/// - **Simulation**: `SimScene` - analytic spheres and oriented boxes
pub trait GeometryQuery {
    /// Closest point on the surface of `shape` to `point`.
    ///
    /// A point inside a solid shape is its own closest point. Returns `None`
    /// when the shape is unknown.
    fn closest_point(&self, shape: ShapeId, point: &Point3<f64>) -> Option<Point3<f64>>;

    /// Casts a ray and returns the nearest enabled shape hit within
    /// `max_distance` whose layer is part of `mask`.
    fn raycast(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
        max_distance: f64,
        mask: LayerMask,
    ) -> Option<RayHit>;

    /// Centre of the shape's bounding volume.
    fn bounds_center(&self, shape: ShapeId) -> Option<Point3<f64>>;

    /// Whether the shape currently takes part in queries. Unknown shapes are
    /// reported as disabled.
    fn is_enabled(&self, shape: ShapeId) -> bool;

    /// Enables or disables a shape. Unknown shapes are ignored.
    fn set_enabled(&mut self, shape: ShapeId, enabled: bool);
}
