//! Scripted hand for simulation.
//!
//! The ScriptedHand plays the tracked device:
//! - Manipulator pose (fixed per scenario)
//! - Index/thumb fingertips placed symmetrically about a pinch centre,
//!   with separation driven by a closure signal
//! - Grip and trigger signals
//! - Optional Gaussian fingertip jitter from a seeded RNG

use handgrasp_core::{FingertipPair, Manipulator};
use handgrasp_env::{InputSample, InputSource};
use nalgebra::{Isometry3, Point3, Unit, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// A scalar that varies over simulation time (seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Constant(f64),

    /// Jumps from `before` to `after` at `at`
    Step { before: f64, after: f64, at: f64 },

    /// Linear from `from` to `to` over [`start`, `start + duration`]
    Ramp { from: f64, to: f64, start: f64, duration: f64 },
}

impl Signal {
    /// Value at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        match *self {
            Signal::Constant(v) => v,
            Signal::Step { before, after, at } => {
                if t < at {
                    before
                } else {
                    after
                }
            }
            Signal::Ramp { from, to, start, duration } => {
                if duration <= 0.0 {
                    return if t < start { from } else { to };
                }
                let s = ((t - start) / duration).clamp(0.0, 1.0);
                from + (to - from) * s
            }
        }
    }
}

/// Scripted manipulator with fingertips and input channels.
pub struct ScriptedHand {
    /// Manipulator world pose
    pub pose: Isometry3<f64>,

    /// Midpoint between the fingertips (world)
    pub pinch_center: Point3<f64>,

    /// Direction from thumb tip to index tip
    pub pinch_axis: Unit<Vector3<f64>>,

    /// Tip separation when open / closed (meters)
    pub open_separation: f64,
    pub closed_separation: f64,

    /// 0 = open, 1 = closed
    pub closure: Signal,

    pub grip: Signal,
    pub trigger: Signal,

    /// Per-axis fingertip noise standard deviation (meters)
    jitter: Option<Normal<f64>>,

    /// Report no fingertips at all
    pub tips_tracked: bool,

    rng: ChaCha8Rng,
}

impl ScriptedHand {
    /// Creates an open, idle hand at the origin.
    pub fn new(seed: u64) -> Self {
        Self {
            pose: Isometry3::identity(),
            pinch_center: Point3::new(0.0, 0.0, 0.1),
            pinch_axis: Vector3::x_axis(),
            open_separation: 0.05,
            closed_separation: 0.015,
            closure: Signal::Constant(0.0),
            grip: Signal::Constant(0.0),
            trigger: Signal::Constant(0.0),
            jitter: None,
            tips_tracked: true,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Sets the fingertip noise. Zero, negative or NaN disables it.
    pub fn set_jitter(&mut self, std_dev: f64) {
        self.jitter = if std_dev > 0.0 {
            Normal::new(0.0, std_dev).ok()
        } else {
            None
        };
    }

    pub fn manipulator(&self) -> Manipulator {
        Manipulator::new(self.pose)
    }

    /// Tip separation at `t` before noise.
    pub fn separation(&self, t: f64) -> f64 {
        let closure = self.closure.value(t).clamp(0.0, 1.0);
        self.open_separation + (self.closed_separation - self.open_separation) * closure
    }

    /// Fingertip positions at `t`.
    pub fn fingertips(&mut self, t: f64) -> FingertipPair {
        if !self.tips_tracked {
            return FingertipPair::missing();
        }

        let half = self.pinch_axis.into_inner() * (self.separation(t) / 2.0);
        let index = self.pinch_center + half + self.noise();
        let thumb = self.pinch_center - half + self.noise();
        FingertipPair::new(index, thumb)
    }

    /// Clamped input at `t`.
    pub fn input(&self, t: f64) -> InputSample {
        let source: &dyn InputSource = &ScriptedInput { hand: self, t };
        InputSample::read(Some(source))
    }

    fn noise(&mut self) -> Vector3<f64> {
        match self.jitter {
            Some(normal) => Vector3::new(
                normal.sample(&mut self.rng),
                normal.sample(&mut self.rng),
                normal.sample(&mut self.rng),
            ),
            None => Vector3::zeros(),
        }
    }
}

/// The hand's input channels sampled at one instant.
struct ScriptedInput<'a> {
    hand: &'a ScriptedHand,
    t: f64,
}

impl InputSource for ScriptedInput<'_> {
    fn grip(&self) -> Option<f64> {
        Some(self.hand.grip.value(self.t))
    }

    fn trigger(&self) -> Option<f64> {
        Some(self.hand.trigger.value(self.t))
    }
}
