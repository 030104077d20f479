//! The "CURL" Engine - finger pose blending from analog inputs.
//!
//! Converts grip/trigger scalars plus the pinch flag into five smoothed curl
//! amounts and writes the resulting joint rotations.
//!
//! Rotations are always composed onto the bind orientation captured at
//! initialization, never onto the joint's current rotation, so repeated
//! frames cannot accumulate drift.

use crate::config::HandConfig;
use crate::digit::{Digit, DigitMap};
use handgrasp_env::{InputSample, JointId, JointTransforms};
use nalgebra::{Unit, UnitQuaternion, Vector3};
use tracing::debug;

/// Fraction of the proximal curl angle applied at the intermediate joint.
pub const INTERMEDIATE_RATIO: f64 = 0.8;

/// Fraction of the proximal curl angle applied at the distal joint.
pub const DISTAL_RATIO: f64 = 0.6;

/// Thumb target weights when not pinching.
const THUMB_GRIP_WEIGHT: f64 = 0.6;
const THUMB_TRIGGER_WEIGHT: f64 = 0.4;

/// Position of a joint along a finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointSlot {
    Proximal,
    Intermediate,
    Distal,
}

impl JointSlot {
    pub const ALL: [JointSlot; 3] = [JointSlot::Proximal, JointSlot::Intermediate, JointSlot::Distal];

    /// Share of the configured max curl applied at this slot.
    pub fn ratio(&self) -> f64 {
        match self {
            JointSlot::Proximal => 1.0,
            JointSlot::Intermediate => INTERMEDIATE_RATIO,
            JointSlot::Distal => DISTAL_RATIO,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Up to three joints of one finger. Missing joints are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JointChain {
    pub proximal: Option<JointId>,
    pub intermediate: Option<JointId>,
    pub distal: Option<JointId>,
}

impl JointChain {
    pub fn new(
        proximal: Option<JointId>,
        intermediate: Option<JointId>,
        distal: Option<JointId>,
    ) -> Self {
        Self {
            proximal,
            intermediate,
            distal,
        }
    }

    /// Joint at `slot`.
    pub fn get(&self, slot: JointSlot) -> Option<JointId> {
        match slot {
            JointSlot::Proximal => self.proximal,
            JointSlot::Intermediate => self.intermediate,
            JointSlot::Distal => self.distal,
        }
    }

    /// Number of configured joints.
    pub fn len(&self) -> usize {
        JointSlot::ALL.iter().filter(|s| self.get(**s).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Static description of one finger plus its captured bind pose.
#[derive(Debug, Clone)]
pub struct FingerDescriptor {
    /// Which digit this is
    pub digit: Digit,

    /// Joint references
    pub chain: JointChain,

    /// Curl at the proximal joint when fully curled (degrees)
    pub max_curl_degrees: f64,

    /// Bend axis in the joint's local frame
    pub bend_axis: Vector3<f64>,

    /// Flip the proximal bend direction
    pub invert: bool,

    /// Bind orientations, indexed by `JointSlot`
    bind: [Option<UnitQuaternion<f64>>; 3],
}

impl FingerDescriptor {
    /// Creates a descriptor; bind orientations are captured later.
    pub fn new(digit: Digit, chain: JointChain, max_curl_degrees: f64, bend_axis: Vector3<f64>, invert: bool) -> Self {
        Self {
            digit,
            chain,
            max_curl_degrees,
            bend_axis,
            invert,
            bind: [None; 3],
        }
    }

    /// Captured bind orientation at `slot`.
    pub fn bind_rotation(&self, slot: JointSlot) -> Option<UnitQuaternion<f64>> {
        self.bind[slot.index()]
    }

    /// Bend angle at `slot` for a curl amount (degrees, signed).
    ///
    /// The invert flag only flips the proximal joint.
    pub fn joint_angle_degrees(&self, slot: JointSlot, curl: f64) -> f64 {
        let angle = curl * self.max_curl_degrees * slot.ratio();
        if slot == JointSlot::Proximal && self.invert {
            -angle
        } else {
            angle
        }
    }

    /// Rotation applied at `slot` for a curl amount, relative to the bind.
    ///
    /// A zero-length bend axis yields the identity.
    pub fn joint_rotation(&self, slot: JointSlot, curl: f64) -> UnitQuaternion<f64> {
        match Unit::try_new(self.bend_axis, 1e-9) {
            Some(axis) => UnitQuaternion::from_axis_angle(
                &axis,
                self.joint_angle_degrees(slot, curl).to_radians(),
            ),
            None => UnitQuaternion::identity(),
        }
    }

    /// Returns the number of joints captured.
    fn capture_bind(&mut self, joints: &dyn JointTransforms) -> usize {
        let mut captured = 0;
        for slot in JointSlot::ALL {
            self.bind[slot.index()] = self.chain.get(slot).and_then(|j| joints.local_rotation(j));
            if self.bind[slot.index()].is_some() {
                captured += 1;
            }
        }
        captured
    }

    fn apply(&self, curl: f64, joints: &mut dyn JointTransforms) {
        for slot in JointSlot::ALL {
            if let (Some(joint), Some(bind)) = (self.chain.get(slot), self.bind_rotation(slot)) {
                joints.set_local_rotation(joint, bind * self.joint_rotation(slot, curl));
            }
        }
    }
}

/// Smoothed curl value chasing a target.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CurlChannel {
    /// Smoothed value in [0, 1]
    pub current: f64,

    /// Target value in [0, 1]
    pub target: f64,
}

impl CurlChannel {
    /// Moves `current` toward `target` by factor `k` in [0, 1].
    pub fn blend(&mut self, k: f64) {
        if k >= 1.0 {
            self.current = self.target;
        } else {
            self.current = (self.current + (self.target - self.current) * k).clamp(0.0, 1.0);
        }
    }
}

/// Interpolation factor for one frame: `dt / blend_time` clamped to [0, 1],
/// or 1 (snap) when `blend_time <= 0`.
pub fn blend_factor(dt: f64, blend_time: f64) -> f64 {
    if !(blend_time > 0.0) {
        return 1.0;
    }
    let k = dt / blend_time;
    if k.is_nan() {
        0.0
    } else {
        k.clamp(0.0, 1.0)
    }
}

/// Curl targets for one frame.
///
/// While pinching, the fixed pinch pose wins regardless of input. Otherwise
/// index follows the trigger, middle/ring/little follow the grip and the
/// thumb mixes both.
pub fn curl_targets(input: InputSample, pinch_active: bool, pinch_pose: &DigitMap<f64>) -> DigitMap<f64> {
    if pinch_active {
        return pinch_pose.map(|_, t| clamp01(*t));
    }

    let grip = clamp01(input.grip);
    let trigger = clamp01(input.trigger);

    DigitMap::from_fn(|digit| match digit {
        Digit::Index => trigger,
        Digit::Thumb => clamp01(grip * THUMB_GRIP_WEIGHT + trigger * THUMB_TRIGGER_WEIGHT),
        Digit::Middle | Digit::Ring | Digit::Little => grip,
    })
}

fn clamp01(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Blends finger curls every frame and writes joint rotations.
///
/// # Usage
///
/// ```ignore
/// let (mut skeleton, chains) = Skeleton::standard_hand();
/// let mut blender = FingerCurlBlender::new(&HandConfig::default(), chains);
/// blender.initialize(&skeleton);
///
/// // every frame
/// blender.update(InputSample::new(grip, trigger), pinch.is_active(), dt, &mut skeleton);
/// ```
#[derive(Debug, Clone)]
pub struct FingerCurlBlender {
    fingers: DigitMap<FingerDescriptor>,
    channels: DigitMap<CurlChannel>,
    pinch_pose: DigitMap<f64>,
    blend_time: f64,
    initialized: bool,
}

impl FingerCurlBlender {
    /// Creates a blender from the hand config and the joint layout.
    pub fn new(config: &HandConfig, chains: DigitMap<JointChain>) -> Self {
        let finger_configs = config.fingers.as_map();
        let fingers = DigitMap::from_fn(|digit| {
            let cfg = &finger_configs[digit];
            FingerDescriptor::new(digit, chains[digit], cfg.max_curl_degrees, cfg.bend_axis, cfg.invert)
        });

        Self {
            fingers,
            channels: DigitMap::default(),
            pinch_pose: config.pinch_pose.as_map(),
            blend_time: config.blend_time_secs,
            initialized: false,
        }
    }

    /// Captures the bind orientation of every configured joint.
    ///
    /// Only the first call captures; later calls return `false` and leave the
    /// stored bind pose untouched.
    pub fn initialize(&mut self, joints: &dyn JointTransforms) -> bool {
        if self.initialized {
            return false;
        }

        let mut captured = 0;
        for (_, finger) in self.fingers.iter_mut() {
            captured += finger.capture_bind(joints);
        }
        self.initialized = true;

        debug!(joints = captured, "captured finger bind pose");
        true
    }

    /// Whether the bind pose has been captured.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Runs one frame: compute targets, blend, apply.
    ///
    /// Captures the bind pose first if `initialize` was never called.
    pub fn update(
        &mut self,
        input: InputSample,
        pinch_active: bool,
        dt: f64,
        joints: &mut dyn JointTransforms,
    ) {
        if !self.initialized {
            self.initialize(&*joints);
        }

        let targets = curl_targets(input, pinch_active, &self.pinch_pose);
        let k = blend_factor(dt, self.blend_time);

        for (digit, channel) in self.channels.iter_mut() {
            channel.target = targets[digit];
            channel.blend(k);
        }

        for (digit, finger) in self.fingers.iter() {
            finger.apply(self.channels[digit].current, joints);
        }
    }

    /// Current smoothed curl of `digit`.
    pub fn curl(&self, digit: Digit) -> f64 {
        self.channels[digit].current
    }

    /// Current target of `digit`.
    pub fn target(&self, digit: Digit) -> f64 {
        self.channels[digit].target
    }

    /// All smoothed curls.
    pub fn curls(&self) -> DigitMap<f64> {
        self.channels.map(|_, c| c.current)
    }

    /// Descriptor of `digit`.
    pub fn finger(&self, digit: Digit) -> &FingerDescriptor {
        &self.fingers[digit]
    }
}
