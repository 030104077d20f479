//! Analytic collision scene for simulation.
//!
//! The scene is the simulator's stand-in for a physics engine's query API:
//! - Spheres and oriented boxes, each on one layer
//! - Closest-point queries (a point inside a solid is its own closest point)
//! - Ray casts returning outward normals
//! - Per-shape enable flags

use handgrasp_env::{EnvError, GeometryQuery, LayerMask, RayHit, ShapeId};
use nalgebra::{Isometry3, Point3, Unit, Vector3};
use serde::Serialize;

/// Geometry of a shape in its local frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeKind {
    Sphere { radius: f64 },
    Cuboid { half_extents: Vector3<f64> },
}

/// A shape placed in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimShape {
    pub kind: ShapeKind,
    pub pose: Isometry3<f64>,
    pub layer: u8,
    pub enabled: bool,
}

impl SimShape {
    fn center(&self) -> Point3<f64> {
        Point3::from(self.pose.translation.vector)
    }

    fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        match self.kind {
            ShapeKind::Sphere { radius } => {
                let offset = point - self.center();
                let dist = offset.norm();
                if dist <= radius {
                    *point
                } else {
                    self.center() + offset * (radius / dist)
                }
            }
            ShapeKind::Cuboid { half_extents } => {
                let local = self.pose.inverse_transform_point(point);
                let clamped = Point3::from(local.coords.zip_map(&half_extents, |v, h| v.clamp(-h, h)));
                if clamped == local {
                    *point
                } else {
                    self.pose.transform_point(&clamped)
                }
            }
        }
    }

    /// Distance along the ray to the surface, plus the outward normal there.
    fn intersect(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<(f64, Vector3<f64>)> {
        match self.kind {
            ShapeKind::Sphere { radius } => {
                let oc = origin - self.center();
                let b = oc.dot(dir);
                let c = oc.norm_squared() - radius * radius;
                let disc = b * b - c;
                if disc < 0.0 {
                    return None;
                }
                let root = disc.sqrt();
                let near = -b - root;
                let t = if near >= 0.0 { near } else { -b + root };
                if t < 0.0 {
                    return None;
                }
                let normal = (origin + dir * t - self.center()) / radius;
                Some((t, normal))
            }
            ShapeKind::Cuboid { half_extents } => {
                let o = self.pose.inverse_transform_point(origin);
                let d = self.pose.inverse_transform_vector(dir);

                let mut t_min = f64::NEG_INFINITY;
                let mut t_max = f64::INFINITY;
                for axis in 0..3 {
                    let h = half_extents[axis];
                    if d[axis].abs() < 1e-12 {
                        if o[axis].abs() > h {
                            return None;
                        }
                        continue;
                    }
                    let t1 = (-h - o[axis]) / d[axis];
                    let t2 = (h - o[axis]) / d[axis];
                    t_min = t_min.max(t1.min(t2));
                    t_max = t_max.min(t1.max(t2));
                }
                if t_max < t_min.max(0.0) {
                    return None;
                }
                let t = if t_min >= 0.0 { t_min } else { t_max };

                // Face normal: the axis where the hit point is deepest into
                // its slab boundary.
                let hit = o + d * t;
                let mut axis = 0;
                let mut best = f64::NEG_INFINITY;
                for i in 0..3 {
                    let score = hit[i].abs() / half_extents[i];
                    if score > best {
                        best = score;
                        axis = i;
                    }
                }
                let mut local_normal = Vector3::zeros();
                local_normal[axis] = hit[axis].signum();
                Some((t, self.pose.transform_vector(&local_normal)))
            }
        }
    }
}

/// Collection of simulated shapes addressed by `ShapeId`.
#[derive(Debug, Clone, Default)]
pub struct SimScene {
    shapes: Vec<SimShape>,
}

impl SimScene {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sphere on layer 0.
    pub fn add_sphere(&mut self, center: Point3<f64>, radius: f64) -> Result<ShapeId, EnvError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(EnvError::invalid_shape(format!("sphere radius {radius}")));
        }
        Ok(self.push(ShapeKind::Sphere { radius }, Isometry3::translation(center.x, center.y, center.z)))
    }

    /// Adds an oriented box on layer 0.
    pub fn add_cuboid(&mut self, pose: Isometry3<f64>, half_extents: Vector3<f64>) -> Result<ShapeId, EnvError> {
        if half_extents.iter().any(|h| !h.is_finite() || *h <= 0.0) {
            return Err(EnvError::invalid_shape(format!(
                "box half extents {:?}",
                half_extents.as_slice()
            )));
        }
        Ok(self.push(ShapeKind::Cuboid { half_extents }, pose))
    }

    /// Moves a shape to another layer.
    pub fn set_layer(&mut self, shape: ShapeId, layer: u8) -> Result<(), EnvError> {
        self.get_mut(shape)?.layer = layer;
        Ok(())
    }

    /// Moves a shape.
    pub fn set_pose(&mut self, shape: ShapeId, pose: Isometry3<f64>) -> Result<(), EnvError> {
        self.get_mut(shape)?.pose = pose;
        Ok(())
    }

    /// Returns a shape by id.
    pub fn shape(&self, shape: ShapeId) -> Option<&SimShape> {
        self.shapes.get(shape.0 as usize)
    }

    /// Number of shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    fn push(&mut self, kind: ShapeKind, pose: Isometry3<f64>) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(SimShape {
            kind,
            pose,
            layer: 0,
            enabled: true,
        });
        id
    }

    fn get_mut(&mut self, shape: ShapeId) -> Result<&mut SimShape, EnvError> {
        self.shapes
            .get_mut(shape.0 as usize)
            .ok_or(EnvError::UnknownShape(shape))
    }
}

impl GeometryQuery for SimScene {
    fn closest_point(&self, shape: ShapeId, point: &Point3<f64>) -> Option<Point3<f64>> {
        self.shape(shape).map(|s| s.closest_point(point))
    }

    fn raycast(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
        max_distance: f64,
        mask: LayerMask,
    ) -> Option<RayHit> {
        let dir = direction.into_inner();

        self.shapes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.enabled && mask.contains(s.layer))
            .filter_map(|(i, s)| {
                let (t, normal) = s.intersect(origin, &dir)?;
                (t <= max_distance).then(|| RayHit {
                    shape: ShapeId(i as u32),
                    point: origin + dir * t,
                    normal,
                    distance: t,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn bounds_center(&self, shape: ShapeId) -> Option<Point3<f64>> {
        self.shape(shape).map(SimShape::center)
    }

    fn is_enabled(&self, shape: ShapeId) -> bool {
        self.shape(shape).map_or(false, |s| s.enabled)
    }

    fn set_enabled(&mut self, shape: ShapeId, enabled: bool) {
        if let Ok(s) = self.get_mut(shape) {
            s.enabled = enabled;
        }
    }
}
