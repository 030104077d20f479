//! Sphere-only geometry fixture for unit tests.

use handgrasp_env::{GeometryQuery, LayerMask, RayHit, ShapeId};
use nalgebra::{Point3, Unit, Vector3};

struct Sphere {
    center: Point3<f64>,
    radius: f64,
    layer: u8,
    enabled: bool,
}

#[derive(Default)]
pub struct SphereScene {
    spheres: Vec<Sphere>,
}

impl SphereScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sphere(&mut self, center: Point3<f64>, radius: f64) -> ShapeId {
        self.add_sphere_on_layer(center, radius, 0)
    }

    pub fn add_sphere_on_layer(&mut self, center: Point3<f64>, radius: f64, layer: u8) -> ShapeId {
        self.spheres.push(Sphere {
            center,
            radius,
            layer,
            enabled: true,
        });
        ShapeId(self.spheres.len() as u32 - 1)
    }

    fn get(&self, shape: ShapeId) -> Option<&Sphere> {
        self.spheres.get(shape.0 as usize)
    }
}

impl GeometryQuery for SphereScene {
    fn closest_point(&self, shape: ShapeId, point: &Point3<f64>) -> Option<Point3<f64>> {
        let s = self.get(shape)?;
        let offset = point - s.center;
        if offset.norm() <= s.radius {
            return Some(*point);
        }
        Some(s.center + offset.normalize() * s.radius)
    }

    fn raycast(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
        max_distance: f64,
        mask: LayerMask,
    ) -> Option<RayHit> {
        let dir = direction.into_inner();
        let mut best: Option<RayHit> = None;

        for (i, s) in self.spheres.iter().enumerate() {
            if !s.enabled || !mask.contains(s.layer) {
                continue;
            }
            let oc = origin - s.center;
            let b = oc.dot(&dir);
            let c = oc.norm_squared() - s.radius * s.radius;
            let disc = b * b - c;
            if disc < 0.0 {
                continue;
            }
            let root = disc.sqrt();
            let t = if -b - root >= 0.0 { -b - root } else { -b + root };
            if t < 0.0 || t > max_distance {
                continue;
            }
            if best.as_ref().map_or(true, |h| t < h.distance) {
                let point = origin + dir * t;
                best = Some(RayHit {
                    shape: ShapeId(i as u32),
                    point,
                    normal: (point - s.center) / s.radius,
                    distance: t,
                });
            }
        }
        best
    }

    fn bounds_center(&self, shape: ShapeId) -> Option<Point3<f64>> {
        self.get(shape).map(|s| s.center)
    }

    fn is_enabled(&self, shape: ShapeId) -> bool {
        self.get(shape).map_or(false, |s| s.enabled)
    }

    fn set_enabled(&mut self, shape: ShapeId, enabled: bool) {
        if let Some(s) = self.spheres.get_mut(shape.0 as usize) {
            s.enabled = enabled;
        }
    }
}
