//! Hand Runtime - Orchestrates the blender and grasp driver with the clock.
//!
//! This module is the per-frame integration layer between the pure logic
//! (curl blending, pinch state, attach solving) and the environment
//! abstraction (`HandContext` plus the collaborator traits).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HandRuntime                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Context: HandContext                     │   │
//! │  │  • now() → timestamp for sessions and stabilizer     │   │
//! │  │  • wait_frame() → frame pacing (caller side)         │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                               │
//! │   1. drain selection   2. poll stabilizer   3. blend curls   │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────┐  │
//! │  │  GraspDriver    │→ │ Stabilizer      │→ │ FingerCurl  │  │
//! │  │  (pinch, attach)│  │ (re-solve once) │  │ Blender     │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use handgrasp_core::{HandConfig, HandRuntime};
//! use handgrasp_env::TokioContext;
//!
//! let mut runtime = HandRuntime::new(TokioContext::shared(), config, chains, palm_colliders);
//! runtime.attach(&mut selection_bus);
//!
//! loop {
//!     ctx.wait_frame(dt).await;
//!     runtime.tick(HandFrame { dt, input, tips, manipulator, geometry, joints });
//! }
//! ```

use crate::config::HandConfig;
use crate::digit::DigitMap;
use crate::finger_curl::{FingerCurlBlender, JointChain};
use crate::grasp_driver::{FrameState, GraspDriver, GraspEvent};
use crate::grasp_solver::{FingertipPair, Manipulator};
use crate::pinch::PinchGestureDriver;
use crate::stabilizer::StabilizerPoll;
use handgrasp_env::{GeometryQuery, HandContext, InputSample, JointTransforms, SelectionSource, ShapeId};

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Everything one cycle reads from and writes to the host.
pub struct HandFrame<'a> {
    /// Time since the previous cycle
    pub dt: Duration,

    /// Clamped grip and trigger
    pub input: InputSample,

    /// Index and thumb tip positions (world space)
    pub tips: FingertipPair,

    /// Manipulator world pose
    pub manipulator: Manipulator,

    /// Collision service
    pub geometry: &'a mut dyn GeometryQuery,

    /// Skeleton written by the blender
    pub joints: &'a mut dyn JointTransforms,
}

/// What happened during one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub now: Duration,
    pub events: Vec<GraspEvent>,
    pub stabilizer: StabilizerPoll,
    pub pinch_active: bool,
}

/// A hand that interprets gestures and computes grasp attachments.
///
/// Generic over the clock, so the same runtime runs against wall time
/// (`TokioContext`) or the simulator's virtual clock.
pub struct HandRuntime<Ctx: HandContext> {
    /// Environment clock
    pub context: Arc<Ctx>,

    /// Configuration
    pub config: HandConfig,

    /// Finger curl engine
    pub blender: FingerCurlBlender,

    /// Pinch override flag
    pub pinch: PinchGestureDriver,

    /// Selection glue, session, attach node
    pub grasp: GraspDriver,

    /// Current tick number
    tick_count: u64,
}

impl<Ctx: HandContext> HandRuntime<Ctx> {
    /// Creates a runtime. `colliders` are the manipulator's own shapes,
    /// disabled while an object is held.
    pub fn new(
        context: Arc<Ctx>,
        config: HandConfig,
        chains: DigitMap<JointChain>,
        colliders: Vec<ShapeId>,
    ) -> Self {
        let blender = FingerCurlBlender::new(&config, chains);
        let grasp = GraspDriver::new(&config, colliders);

        Self {
            context,
            config,
            blender,
            pinch: PinchGestureDriver::new(),
            grasp,
            tick_count: 0,
        }
    }

    /// Captures the bind pose now instead of on the first tick.
    pub fn initialize(&mut self, joints: &dyn JointTransforms) {
        self.blender.initialize(joints);
    }

    /// Subscribes to grasp events.
    pub fn attach(&mut self, source: &mut dyn SelectionSource) {
        self.grasp.attach(source);
    }

    /// Unsubscribes from grasp events.
    pub fn shutdown(&mut self, source: &mut dyn SelectionSource) {
        self.grasp.detach(source);
        debug!(ticks = self.tick_count, "hand runtime shut down");
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Runs one cycle: selection events, stabilizer, then finger curls.
    pub fn tick(&mut self, frame: HandFrame<'_>) -> TickReport {
        self.tick_count += 1;
        let now = self.context.now();

        let state = FrameState {
            now,
            tips: frame.tips,
            manipulator: frame.manipulator,
        };

        let mut events = self.grasp.process_events(&state, &mut self.pinch, frame.geometry);
        let (stabilizer, resolved) = self.grasp.tick_stabilizer(&state, &*frame.geometry);
        events.extend(resolved);

        self.blender.update(
            frame.input,
            self.pinch.is_active(),
            frame.dt.as_secs_f64(),
            frame.joints,
        );

        TickReport {
            tick: self.tick_count,
            now,
            events,
            stabilizer,
            pinch_active: self.pinch.is_active(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digit::Digit;
    use crate::rig::Skeleton;
    use crate::test_support::SphereScene;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use handgrasp_env::{GrabbedObject, ObjectId, SelectionBus, SelectionEvent};
    use nalgebra::{Isometry3, Point3};
    use std::sync::atomic::{AtomicU64, Ordering};

    const DT: Duration = Duration::from_nanos(11_111_111);

    /// Clock that only moves when told to.
    #[derive(Default)]
    struct ManualClock {
        nanos: AtomicU64,
    }

    impl ManualClock {
        fn advance(&self, dt: Duration) {
            self.nanos.fetch_add(dt.as_nanos() as u64, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl HandContext for ManualClock {
        fn now(&self) -> Duration {
            Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
        }

        async fn wait_frame(&self, dt: Duration) {
            self.advance(dt);
        }

        fn seed(&self) -> u64 {
            0
        }
    }

    struct Bench {
        clock: Arc<ManualClock>,
        runtime: HandRuntime<ManualClock>,
        bus: SelectionBus,
        scene: SphereScene,
        skeleton: Skeleton,
        ball: ShapeId,
    }

    fn bench() -> Bench {
        let clock = Arc::new(ManualClock::default());
        let (skeleton, chains) = Skeleton::standard_hand();
        let mut scene = SphereScene::new();
        let ball = scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1);
        let palm = scene.add_sphere(Point3::new(0.0, -0.3, 0.0), 0.04);
        let mut bus = SelectionBus::new();

        let mut runtime = HandRuntime::new(clock.clone(), HandConfig::default(), chains, vec![palm]);
        runtime.attach(&mut bus);

        Bench {
            clock,
            runtime,
            bus,
            scene,
            skeleton,
            ball,
        }
    }

    impl Bench {
        fn step(&mut self, input: InputSample, separation: f64) -> TickReport {
            let half = separation / 2.0;
            let report = self.runtime.tick(HandFrame {
                dt: DT,
                input,
                tips: FingertipPair::new(Point3::new(half, 0.0, 0.35), Point3::new(-half, 0.0, 0.35)),
                manipulator: Manipulator::new(Isometry3::translation(0.0, 0.0, 0.2)),
                geometry: &mut self.scene,
                joints: &mut self.skeleton,
            });
            self.clock.advance(DT);
            report
        }
    }

    #[test]
    fn test_grip_curls_fingers_without_grasp() {
        let mut bench = bench();
        for _ in 0..120 {
            bench.step(InputSample::new(1.0, 0.0), 0.05);
        }

        let blender = &bench.runtime.blender;
        assert_relative_eq!(blender.curl(Digit::Index), 0.0, epsilon = 1e-6);
        assert_relative_eq!(blender.curl(Digit::Middle), 1.0, epsilon = 1e-6);
        assert_relative_eq!(blender.curl(Digit::Little), 1.0, epsilon = 1e-6);
        assert_relative_eq!(blender.curl(Digit::Thumb), 0.6, epsilon = 1e-6);
        assert_eq!(bench.runtime.tick_count(), 120);
    }

    #[test]
    fn test_grasp_switches_blender_to_pinch_pose() {
        let mut bench = bench();
        let object = GrabbedObject::new(ObjectId::from_seed(5), vec![bench.ball]);
        let object_id = object.id;
        bench.bus.emit(SelectionEvent::GraspBegin(object));

        let first = bench.step(InputSample::new(0.0, 0.0), 0.05);
        assert!(first.pinch_active);
        assert_eq!(first.stabilizer, StabilizerPoll::Waiting);
        assert!(matches!(first.events[0], GraspEvent::Began { .. }));

        let mut resolved = 0;
        for _ in 0..150 {
            let report = bench.step(InputSample::new(0.0, 0.0), 0.05);
            resolved += report
                .events
                .iter()
                .filter(|e| matches!(e, GraspEvent::Resolved { .. }))
                .count();
        }
        assert_eq!(resolved, 1);

        let blender = &bench.runtime.blender;
        assert_relative_eq!(blender.curl(Digit::Index), 1.0, epsilon = 1e-6);
        assert_relative_eq!(blender.curl(Digit::Ring), 0.1, epsilon = 1e-6);

        bench.bus.emit(SelectionEvent::GraspEnd { object: object_id });
        let last = bench.step(InputSample::new(0.0, 0.0), 0.05);
        assert!(!last.pinch_active);
        assert!(bench.runtime.grasp.attach_node().is_identity());
    }

    #[test]
    fn test_shutdown_detaches() {
        let mut bench = bench();
        bench.runtime.shutdown(&mut bench.bus);
        assert_eq!(bench.bus.subscriber_count(), 0);

        bench.bus.emit(SelectionEvent::GraspBegin(GrabbedObject::new(ObjectId::from_seed(1), vec![])));
        let report = bench.step(InputSample::default(), 0.05);
        assert!(report.events.is_empty());
        assert!(!report.pinch_active);
    }

    #[test]
    fn test_explicit_initialize_captures_bind_pose() {
        let mut bench = bench();
        bench.runtime.initialize(&bench.skeleton);
        assert!(bench.runtime.blender.is_initialized());
    }
}
