//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::hand::ScriptedHand;
use crate::scene::SimScene;

use handgrasp_core::{FingertipPair, HandConfig, HandFrame, HandRuntime, Skeleton, TickReport};
use handgrasp_env::{EnvError, HandContext, SelectionBus, SelectionEvent, ShapeId};
use nalgebra::{Isometry3, Point3};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Tick rate in Hz
    pub tick_rate_hz: u32,

    /// Fingertip noise standard deviation (meters)
    pub jitter_std: f64,
}

impl SimConfig {
    /// Frame period.
    pub fn dt(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_rate_hz: 90,
            jitter_std: 0.0003,
        }
    }
}

/// A selection event due at a given simulation time.
#[derive(Debug, Clone)]
struct ScheduledEvent {
    at: Duration,
    event: SelectionEvent,
}

/// The SimWorld - one hand, one scene, one selection bus.
pub struct SimWorld<Ctx: HandContext> {
    /// Configuration
    pub config: SimConfig,

    /// Shared clock
    pub context: Arc<Ctx>,

    /// Hand under test
    pub runtime: HandRuntime<Ctx>,

    /// Selection event source
    pub bus: SelectionBus,

    /// Collision scene
    pub scene: SimScene,

    /// Joint store driven by the blender
    pub skeleton: Skeleton,

    /// Scripted device
    pub hand: ScriptedHand,

    /// The manipulator's own collider
    pub palm: ShapeId,

    /// Clock reading at construction
    start: Duration,

    schedule: VecDeque<ScheduledEvent>,
    last_tips: FingertipPair,
    tick_count: u64,
}

impl<Ctx: HandContext> SimWorld<Ctx> {
    /// Creates a world with a standard hand rig and a palm collider.
    pub fn new(context: Arc<Ctx>, config: SimConfig, hand_config: HandConfig) -> Result<Self, EnvError> {
        // Hand RNG is derived separately from the context seed so that
        // changing the rig does not reshuffle fingertip noise.
        let hand_seed = config.seed.wrapping_mul(0x517cc1b727220a95);
        let mut hand = ScriptedHand::new(hand_seed);
        hand.set_jitter(config.jitter_std);

        let mut scene = SimScene::new();
        let origin = hand.pose.translation.vector;
        let palm = scene.add_sphere(Point3::from(origin), 0.04)?;
        scene.set_layer(palm, 1)?;

        let (skeleton, chains) = Skeleton::standard_hand();
        let mut runtime = HandRuntime::new(context.clone(), hand_config, chains, vec![palm]);
        runtime.initialize(&skeleton);

        let mut bus = SelectionBus::new();
        runtime.attach(&mut bus);

        let start = context.now();
        Ok(Self {
            config,
            context,
            runtime,
            bus,
            scene,
            skeleton,
            hand,
            palm,
            start,
            schedule: VecDeque::new(),
            last_tips: FingertipPair::missing(),
            tick_count: 0,
        })
    }

    /// Queues `event` for the first tick at or after `at` (since start).
    pub fn schedule(&mut self, at: Duration, event: SelectionEvent) {
        let pos = self.schedule.partition_point(|e| e.at <= at);
        self.schedule.insert(pos, ScheduledEvent { at, event });
    }

    /// Moves the manipulator and its palm collider.
    pub fn place_hand(&mut self, pose: Isometry3<f64>) -> Result<(), EnvError> {
        self.hand.pose = pose;
        self.scene.set_pose(self.palm, pose)
    }

    /// Time since the world was created.
    pub fn elapsed(&self) -> Duration {
        self.context.now().saturating_sub(self.start)
    }

    /// Fingertips fed to the most recent tick.
    pub fn last_tips(&self) -> &FingertipPair {
        &self.last_tips
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Runs one frame without advancing the clock.
    pub fn tick(&mut self) -> TickReport {
        self.tick_count += 1;
        let elapsed = self.elapsed();

        while self.schedule.front().map_or(false, |e| e.at <= elapsed) {
            if let Some(due) = self.schedule.pop_front() {
                trace!(at_ms = due.at.as_millis() as u64, "emitting scheduled selection event");
                self.bus.emit(due.event);
            }
        }

        let t = elapsed.as_secs_f64();
        let tips = self.hand.fingertips(t);
        let input = self.hand.input(t);
        self.last_tips = tips;

        self.runtime.tick(HandFrame {
            dt: self.config.dt(),
            input,
            tips,
            manipulator: self.hand.manipulator(),
            geometry: &mut self.scene,
            joints: &mut self.skeleton,
        })
    }

    /// Runs one frame, then waits a frame period on the context clock.
    pub async fn step(&mut self) -> TickReport {
        let report = self.tick();
        self.context.wait_frame(self.config.dt()).await;
        report
    }

    /// Detaches the hand from the selection bus.
    pub fn shutdown(&mut self) {
        self.runtime.shutdown(&mut self.bus);
    }
}

impl SimWorld<SimContext> {
    /// Runs one frame and advances virtual time by a frame period.
    pub fn step_virtual(&mut self) -> TickReport {
        let report = self.tick();
        self.context.advance_time(self.config.dt());
        report
    }
}
