//! Grasp Metrics Module
//! ====================
//!
//! Counters describing how grasps were resolved:
//! - **Lifecycle**: grasps started/released, ignored releases, authored skips
//! - **Solver**: solve count and which normal estimate each solve used
//! - **Stabilizer**: delayed re-solves vs cancellations
//!
//! Degenerate-geometry fallbacks never raise errors; these counters are how
//! a host (or the simulation harness) sees them.

use crate::grasp_solver::{NormalSource, SolveOutcome};
use serde::Serialize;

/// Running totals for one `GraspDriver`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraspMetrics {
    pub grasps_started: u64,
    pub grasps_released: u64,

    /// Grasp-end events that did not match the live session
    pub ignored_releases: u64,

    /// Grasps that kept the object's authored attach pose
    pub authored_skips: u64,

    pub solves: u64,
    pub raycast_normals: u64,
    pub bounds_normals: u64,
    pub pinch_axis_normals: u64,

    /// Solves whose orientation used the manipulator forward
    pub forward_fallbacks: u64,

    pub stabilizer_resolves: u64,
    pub stabilizer_cancelled: u64,
}

impl GraspMetrics {
    /// Counts one solve and its fallbacks.
    pub fn record_solve(&mut self, outcome: &SolveOutcome) {
        self.solves += 1;
        match outcome.normal_source {
            NormalSource::Raycast => self.raycast_normals += 1,
            NormalSource::BoundsCenter => self.bounds_normals += 1,
            NormalSource::PinchAxis => self.pinch_axis_normals += 1,
        }
        if outcome.forward_fallback {
            self.forward_fallbacks += 1;
        }
    }

    /// Share of solves that needed a fallback normal, in [0, 1].
    pub fn fallback_ratio(&self) -> f64 {
        if self.solves == 0 {
            return 0.0;
        }
        (self.bounds_normals + self.pinch_axis_normals) as f64 / self.solves as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AttachFrame;
    use nalgebra::{Point3, Vector3};

    fn outcome(source: NormalSource, forward_fallback: bool) -> SolveOutcome {
        SolveOutcome {
            frame: AttachFrame::identity(),
            contact: Point3::origin(),
            normal: Vector3::zeros(),
            normal_source: source,
            contact_shape: None,
            forward_fallback,
        }
    }

    #[test]
    fn test_record_solve_counts_sources() {
        let mut metrics = GraspMetrics::default();
        metrics.record_solve(&outcome(NormalSource::Raycast, false));
        metrics.record_solve(&outcome(NormalSource::BoundsCenter, false));
        metrics.record_solve(&outcome(NormalSource::PinchAxis, true));
        metrics.record_solve(&outcome(NormalSource::Raycast, false));

        assert_eq!(metrics.solves, 4);
        assert_eq!(metrics.raycast_normals, 2);
        assert_eq!(metrics.bounds_normals, 1);
        assert_eq!(metrics.pinch_axis_normals, 1);
        assert_eq!(metrics.forward_fallbacks, 1);
        assert!((metrics.fallback_ratio() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_fallback_ratio_without_solves() {
        assert_eq!(GraspMetrics::default().fallback_ratio(), 0.0);
    }
}
