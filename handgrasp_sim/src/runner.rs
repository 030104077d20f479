//! Scenario runner - executes grasp scenarios and checks their outcome.

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{SimExport, SimFrame};
use crate::hand::Signal;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use handgrasp_core::finger_curl::curl_targets;
use handgrasp_core::{Digit, DigitMap, GraspEvent, GraspMetrics, HandConfig, NormalSource, SessionId, TickReport};
use handgrasp_env::{
    GeometryQuery, GrabbedObject, HandContext, InputSample, ObjectId, SelectionEvent, TokioContext,
};
use nalgebra::{Isometry3, Point3, Vector3};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Curl tolerance for the blend scenario.
const CURL_TOLERANCE: f64 = 1e-3;

/// Time of the first grasp-begin in every grasp scenario (seconds).
const GRASP_AT: f64 = 0.1;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    #[serde(serialize_with = "serialize_scenario")]
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

fn serialize_scenario<S: serde::Serializer>(id: &ScenarioId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(id.name())
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Grasp driver counters at the end of the run
    pub grasp: GraspMetrics,

    /// Delay from grasp-begin to each stabilizer re-solve (ms)
    pub resolve_delays_ms: Vec<f64>,

    /// Smoothed curls at the end of the run
    pub final_curls: DigitMap<f64>,

    /// Ticks on which a held frame was non-finite
    pub non_finite_frames: u64,
}

/// Objects created by a scenario's setup, in creation order.
#[derive(Debug, Default)]
struct Setup {
    objects: Vec<ObjectId>,
}

/// Everything the checks need from the tick stream.
#[derive(Debug, Default)]
struct Observer {
    /// Clock reading per tick, as seen by the runtime
    times: Vec<Duration>,

    /// Events with the index of the tick that produced them
    events: Vec<(usize, GraspEvent)>,

    pinch_seen: bool,
    non_finite_frames: u64,
}

impl Observer {
    fn record<Ctx: HandContext>(&mut self, report: &TickReport, world: &SimWorld<Ctx>) {
        let index = self.times.len();
        self.times.push(report.now);
        self.events.extend(report.events.iter().map(|e| (index, *e)));
        self.pinch_seen |= report.pinch_active;

        if let Some(session) = world.runtime.grasp.session() {
            if !session.frame().is_finite() {
                self.non_finite_frames += 1;
            }
        }
    }

    fn count(&self, pred: impl Fn(&GraspEvent) -> bool) -> usize {
        self.events.iter().filter(|(_, e)| pred(e)).count()
    }

    fn began(&self) -> Vec<(usize, SessionId)> {
        self.events
            .iter()
            .filter_map(|(i, e)| match e {
                GraspEvent::Began { session, .. } => Some((*i, *session)),
                _ => None,
            })
            .collect()
    }

    fn resolved(&self) -> Vec<(usize, SessionId)> {
        self.events
            .iter()
            .filter_map(|(i, e)| match e {
                GraspEvent::Resolved { session } => Some((*i, *session)),
                _ => None,
            })
            .collect()
    }

    /// Delays from each resolved session's begin to its re-solve.
    fn resolve_delays(&self) -> Vec<Duration> {
        let began = self.began();
        self.resolved()
            .into_iter()
            .filter_map(|(tick, session)| {
                let (start, _) = began.iter().find(|(_, s)| *s == session)?;
                Some(self.times[tick].saturating_sub(self.times[*start]))
            })
            .collect()
    }
}

/// Runs grasp scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Duration override in seconds
    duration_secs: Option<f64>,

    /// Fingertip noise (meters)
    jitter_std: f64,

    /// Hand under test
    hand_config: HandConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        let defaults = SimConfig::default();
        Self {
            seed,
            tick_rate_hz: defaults.tick_rate_hz,
            duration_secs: None,
            jitter_std: defaults.jitter_std,
            hand_config: HandConfig::default(),
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Overrides every scenario's duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Sets the fingertip noise.
    pub fn with_jitter(mut self, std_dev: f64) -> Self {
        self.jitter_std = std_dev;
        self
    }

    /// Uses `config` for the hand under test.
    pub fn with_config(mut self, config: HandConfig) -> Self {
        self.hand_config = config;
        self
    }

    /// Runs a scenario on the virtual clock.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_virtual(scenario, None)
    }

    /// Runs a scenario on the virtual clock and records every frame.
    pub fn run_recorded(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(scenario.name(), self.seed, self.tick_rate_hz);
        let result = self.run_virtual(scenario, Some(&mut export));
        export.finalize(result.passed, result.failure_reason.clone(), result.metrics.grasp);
        (result, export)
    }

    /// Runs a scenario against wall-clock time on a tokio runtime.
    pub fn run_realtime(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(SimError::Runtime)?;

        runtime.block_on(async {
            info!("Starting scenario: {} (seed={}, realtime)", scenario.name(), self.seed);
            let (mut world, setup) = self.prepare(scenario, TokioContext::shared())?;

            let mut observer = Observer::default();
            for _ in 0..self.target_ticks(scenario) {
                let report = world.step().await;
                observer.record(&report, &world);
            }

            Ok::<_, SimError>(self.finish(scenario, &mut world, &observer, &setup))
        })
    }

    fn run_virtual(&self, scenario: ScenarioId, mut export: Option<&mut SimExport>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let (mut world, setup) = match self.prepare(scenario, SimContext::shared(self.seed)) {
            Ok(prepared) => prepared,
            Err(e) => return self.setup_failure(scenario, e),
        };

        let mut observer = Observer::default();
        for _ in 0..self.target_ticks(scenario) {
            let report = world.step_virtual();
            observer.record(&report, &world);
            if let Some(export) = export.as_deref_mut() {
                export.add_frame(SimFrame::capture(&world, &report));
            }
        }

        self.finish(scenario, &mut world, &observer, &setup)
    }

    fn target_ticks(&self, scenario: ScenarioId) -> u64 {
        let secs = self.duration_secs.unwrap_or_else(|| scenario.default_duration());
        (secs.max(0.0) * self.tick_rate_hz as f64).ceil() as u64
    }

    fn hand_config_for(&self, scenario: ScenarioId) -> HandConfig {
        let mut config = self.hand_config.clone();
        if scenario == ScenarioId::AuthoredAttach {
            config.grasp.ignore_authored_attach_poses = false;
        }
        config
    }

    /// Builds the world and arranges the scenario in it.
    fn prepare<Ctx: HandContext>(
        &self,
        scenario: ScenarioId,
        context: Arc<Ctx>,
    ) -> Result<(SimWorld<Ctx>, Setup), SimError> {
        let sim_config = SimConfig {
            seed: self.seed,
            tick_rate_hz: self.tick_rate_hz,
            jitter_std: self.jitter_std,
        };
        let mut world = SimWorld::new(context, sim_config, self.hand_config_for(scenario))?;
        let setup = arrange(scenario, &mut world)?;
        debug!(objects = setup.objects.len(), shapes = world.scene.len(), "scenario arranged");
        Ok((world, setup))
    }

    fn finish<Ctx: HandContext>(
        &self,
        scenario: ScenarioId,
        world: &mut SimWorld<Ctx>,
        observer: &Observer,
        setup: &Setup,
    ) -> ScenarioResult {
        let outcome = check(scenario, world, observer, setup);
        world.shutdown();

        let metrics = ScenarioMetrics {
            grasp: *world.runtime.grasp.metrics(),
            resolve_delays_ms: observer
                .resolve_delays()
                .iter()
                .map(|d| d.as_secs_f64() * 1000.0)
                .collect(),
            final_curls: world.runtime.blender.curls(),
            non_finite_frames: observer.non_finite_frames,
        };

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("  {} ({} ticks)", scenario.description(), world.tick_count());
        info!(
            "    Grasps: {} started, {} released | Solves: {} ({} raycast, {} bounds, {} axis)",
            metrics.grasp.grasps_started,
            metrics.grasp.grasps_released,
            metrics.grasp.solves,
            metrics.grasp.raycast_normals,
            metrics.grasp.bounds_normals,
            metrics.grasp.pinch_axis_normals,
        );
        info!(
            "    Stabilizer: {} resolved, {} cancelled {:?}",
            metrics.grasp.stabilizer_resolves, metrics.grasp.stabilizer_cancelled, metrics.resolve_delays_ms,
        );
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let failure_reason = outcome.err();
        match &failure_reason {
            None => info!("✓ {} complete", scenario.name()),
            Some(reason) => warn!("✗ {} failed: {}", scenario.name(), reason),
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            total_ticks: world.tick_count(),
            final_time_secs: world.elapsed().as_secs_f64(),
            failure_reason,
            metrics,
        }
    }

    fn setup_failure(&self, scenario: ScenarioId, error: SimError) -> ScenarioResult {
        warn!("✗ {} setup failed: {}", scenario.name(), error);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: Some(error.to_string()),
            metrics: ScenarioMetrics::default(),
        }
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

/// Hand 15cm in front of its palm, ball 10cm beyond the pinch point.
fn standard_grasp_layout<Ctx: HandContext>(world: &mut SimWorld<Ctx>) -> Result<(), SimError> {
    world.place_hand(Isometry3::translation(0.0, 0.0, 0.2))?;
    world.hand.pinch_center = Point3::new(0.0, 0.0, 0.35);
    world.hand.pinch_axis = Vector3::x_axis();
    Ok(())
}

fn arrange<Ctx: HandContext>(scenario: ScenarioId, world: &mut SimWorld<Ctx>) -> Result<Setup, SimError> {
    let mut setup = Setup::default();
    let mut object_seed = world.config.seed.wrapping_mul(1000);
    let mut next_object = |setup: &mut Setup| {
        object_seed += 1;
        let id = ObjectId::from_seed(object_seed);
        setup.objects.push(id);
        id
    };

    match scenario {
        ScenarioId::CurlBlend => {
            world.hand.grip = Signal::Constant(1.0);
            world.hand.trigger = Signal::Constant(0.0);
        }

        ScenarioId::SettleTimeout => {
            standard_grasp_layout(world)?;
            let crate_box = world.scene.add_cuboid(
                Isometry3::translation(0.0, 0.0, 0.5),
                Vector3::new(0.1, 0.1, 0.1),
            )?;
            let object = GrabbedObject::new(next_object(&mut setup), vec![crate_box]);
            world.schedule(secs(GRASP_AT), SelectionEvent::GraspBegin(object));
        }

        ScenarioId::EarlyRelease => {
            standard_grasp_layout(world)?;
            let ball = world.scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1)?;
            let id = next_object(&mut setup);
            world.schedule(secs(GRASP_AT), SelectionEvent::GraspBegin(GrabbedObject::new(id, vec![ball])));
            world.schedule(secs(GRASP_AT + 0.03), SelectionEvent::GraspEnd { object: id });
        }

        ScenarioId::PinchClose => {
            standard_grasp_layout(world)?;
            let ball = world.scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1)?;
            let object = GrabbedObject::new(next_object(&mut setup), vec![ball]);
            world.schedule(secs(GRASP_AT), SelectionEvent::GraspBegin(object));
            world.hand.closure = Signal::Ramp {
                from: 0.0,
                to: 1.0,
                start: GRASP_AT,
                duration: 0.03,
            };
        }

        ScenarioId::Regrab => {
            standard_grasp_layout(world)?;
            let ball = world.scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1)?;
            let first = GrabbedObject::new(next_object(&mut setup), vec![ball]);
            let second = GrabbedObject::new(next_object(&mut setup), vec![ball]);
            world.schedule(secs(GRASP_AT), SelectionEvent::GraspBegin(first));
            world.schedule(secs(GRASP_AT + 0.04), SelectionEvent::GraspBegin(second));
        }

        ScenarioId::NoColliders => {
            standard_grasp_layout(world)?;
            // Pinch axis along the manipulator's up
            world.hand.pinch_axis = Vector3::y_axis();
            world.hand.set_jitter(0.0);
            let object = GrabbedObject::new(next_object(&mut setup), Vec::new());
            world.schedule(secs(GRASP_AT), SelectionEvent::GraspBegin(object));
        }

        ScenarioId::AuthoredAttach => {
            standard_grasp_layout(world)?;
            let ball = world.scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1)?;
            let id = next_object(&mut setup);
            let object = GrabbedObject::new(id, vec![ball])
                .with_authored_attach(Isometry3::translation(0.0, 0.02, 0.0));
            world.schedule(secs(GRASP_AT), SelectionEvent::GraspBegin(object));
            world.schedule(secs(GRASP_AT + 0.2), SelectionEvent::GraspEnd { object: id });
        }
    }

    Ok(setup)
}

fn ensure(cond: bool, reason: impl FnOnce() -> String) -> Result<(), String> {
    if cond {
        Ok(())
    } else {
        Err(reason())
    }
}

/// Checks that session `began` at tick `start` was re-solved on the first
/// tick whose elapsed time reached the timeout, and not earlier.
fn check_resolved_at_timeout(
    observer: &Observer,
    start: usize,
    resolve: usize,
    timeout: Duration,
) -> Result<(), String> {
    let elapsed = |tick: usize| observer.times[tick].saturating_sub(observer.times[start]);
    ensure(elapsed(resolve) >= timeout, || {
        format!("re-solve after {:?}, before the {:?} timeout", elapsed(resolve), timeout)
    })?;
    ensure(resolve > start && elapsed(resolve - 1) < timeout, || {
        format!("re-solve at tick {} came later than the first tick past the timeout", resolve)
    })
}

fn check<Ctx: HandContext>(
    scenario: ScenarioId,
    world: &SimWorld<Ctx>,
    observer: &Observer,
    setup: &Setup,
) -> Result<(), String> {
    let grasp = &world.runtime.grasp;
    let timeout = world.runtime.config.stabilizer.timeout();
    let began = observer.began();
    let resolved = observer.resolved();

    ensure(observer.non_finite_frames == 0, || {
        format!("{} ticks held a non-finite attach frame", observer.non_finite_frames)
    })?;

    match scenario {
        ScenarioId::CurlBlend => {
            let expected = curl_targets(
                InputSample::new(1.0, 0.0),
                false,
                &world.runtime.config.pinch_pose.as_map(),
            );
            let curls = world.runtime.blender.curls();
            for digit in Digit::ALL {
                ensure((curls[digit] - expected[digit]).abs() <= CURL_TOLERANCE, || {
                    format!("{} curl {:.4}, expected {:.4}", digit, curls[digit], expected[digit])
                })?;
            }
            ensure(observer.events.is_empty(), || "unexpected grasp events".to_string())
        }

        ScenarioId::SettleTimeout => {
            ensure(began.len() == 1, || format!("{} grasps began, expected 1", began.len()))?;
            ensure(resolved.len() == 1, || format!("{} re-solves, expected 1", resolved.len()))?;
            let (start, session) = began[0];
            let (tick, resolved_session) = resolved[0];
            ensure(resolved_session == session, || "re-solved the wrong session".to_string())?;
            check_resolved_at_timeout(observer, start, tick, timeout)?;

            let held = grasp.session().ok_or("session ended without a release")?;
            ensure(held.solve_count() == 2, || format!("{} solves, expected 2", held.solve_count()))?;
            ensure(
                grasp.last_outcome().map(|o| o.normal_source) == Some(NormalSource::Raycast),
                || "re-solve did not use the raycast normal".to_string(),
            )
        }

        ScenarioId::EarlyRelease => {
            ensure(began.len() == 1, || format!("{} grasps began, expected 1", began.len()))?;
            ensure(resolved.is_empty(), || "stabilizer re-solved a released grasp".to_string())?;
            ensure(
                observer.count(|e| matches!(e, GraspEvent::Released { .. })) == 1,
                || "grasp was not released".to_string(),
            )?;
            ensure(
                observer.count(|e| matches!(e, GraspEvent::StabilizerCancelled { .. })) == 1,
                || "stabilizer was not cancelled".to_string(),
            )?;
            ensure(grasp.session().is_none(), || "session survived the release".to_string())?;
            ensure(grasp.attach_node().is_identity(), || "attach node not reset".to_string())?;
            ensure(!world.runtime.pinch.is_active(), || "pinch still active".to_string())?;
            ensure(world.scene.is_enabled(world.palm), || "palm collider still disabled".to_string())
        }

        ScenarioId::PinchClose => {
            ensure(resolved.len() == 1, || format!("{} re-solves, expected 1", resolved.len()))?;
            let delays = observer.resolve_delays();
            let delay = delays.first().copied().ok_or("re-solve without a matching begin")?;
            ensure(delay > Duration::ZERO && delay < timeout, || {
                format!("re-solve after {:?}, expected before the {:?} timeout", delay, timeout)
            })
        }

        ScenarioId::Regrab => {
            ensure(began.len() == 2, || format!("{} grasps began, expected 2", began.len()))?;
            ensure(resolved.len() == 1, || format!("{} re-solves, expected 1", resolved.len()))?;
            let (start, second) = began[1];
            let (tick, session) = resolved[0];
            ensure(session == second, || format!("re-solved {}, expected {}", session, second))?;
            check_resolved_at_timeout(observer, start, tick, timeout)?;
            ensure(grasp.metrics().stabilizer_cancelled >= 1, || {
                "first stabilizer was not superseded".to_string()
            })?;

            let held = grasp.session().ok_or("second grasp not held")?;
            ensure(Some(&held.object().id) == setup.objects.get(1), || {
                "holding the wrong object".to_string()
            })
        }

        ScenarioId::NoColliders => {
            ensure(began.len() == 1, || format!("{} grasps began, expected 1", began.len()))?;
            let outcome = grasp.last_outcome().ok_or("no solve recorded")?;
            ensure(outcome.normal_source == NormalSource::PinchAxis, || {
                format!("normal from {:?}, expected the pinch axis", outcome.normal_source)
            })?;
            ensure(outcome.forward_fallback, || "orientation did not fall back to forward".to_string())?;
            ensure((outcome.contact - world.hand.pinch_center).norm() < 1e-9, || {
                "contact is not the fingertip midpoint".to_string()
            })?;
            ensure(outcome.frame.is_finite(), || "attach frame is not finite".to_string())
        }

        ScenarioId::AuthoredAttach => {
            ensure(began.is_empty(), || "dynamic grasp started".to_string())?;
            ensure(
                observer.count(|e| matches!(e, GraspEvent::AuthoredAttach { .. })) == 1,
                || "authored attach not reported".to_string(),
            )?;
            ensure(
                observer.count(|e| matches!(e, GraspEvent::AuthoredReleased { .. })) == 1,
                || "authored release not reported".to_string(),
            )?;
            ensure(!observer.pinch_seen, || "pinch activated for an authored attach".to_string())?;
            ensure(grasp.metrics().authored_skips == 1, || "authored skip not counted".to_string())
        }
    }
}
