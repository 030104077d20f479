//! Grasp lifecycle glue.
//!
//! `GraspDriver` listens to a `SelectionSource`, owns the live
//! `GraspSession`, and is the only writer of the manipulator's `AttachNode`.
//! On grasp-begin it pinches, disables the manipulator's own colliders,
//! solves the attach frame and arms the stabilizer. On grasp-end it undoes
//! all of that. Between the two, `tick_stabilizer` applies the one delayed
//! re-solve.
//!
//! Within a cycle the caller must run `process_events` before
//! `tick_stabilizer`; that way the stabilizer's first poll lands in the same
//! cycle as the grasp-begin that armed it.

use crate::config::HandConfig;
use crate::grasp_solver::{FingertipPair, GraspAttachmentSolver, Manipulator, SolveOutcome};
use crate::metrics::GraspMetrics;
use crate::pinch::PinchGestureDriver;
use crate::session::{AttachNode, GraspSession, SessionId};
use crate::stabilizer::{AttachmentStabilizer, StabilizerPoll};
use handgrasp_env::{GeometryQuery, GrabbedObject, ObjectId, SelectionEvent, SelectionSource, ShapeId, Subscription};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-cycle tracking state the driver reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub now: Duration,
    pub tips: FingertipPair,
    pub manipulator: Manipulator,
}

/// What the driver did with a selection event or stabilizer poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraspEvent {
    /// Dynamic attach solved for a new session
    Began { session: SessionId, object: ObjectId },
    /// Object kept its authored attach pose
    AuthoredAttach { object: ObjectId },
    /// Session ended and the attach node was reset
    Released { session: SessionId, object: ObjectId },
    /// Object held with its authored attach pose was let go
    AuthoredReleased { object: ObjectId },
    /// Grasp-end that matched no live grasp
    IgnoredRelease { object: ObjectId },
    /// Stabilizer re-solved the live session
    Resolved { session: SessionId },
    /// Stabilizer exited without re-solving
    StabilizerCancelled { session: SessionId },
}

/// Owns the grasp session, attach node and stabilizer of one manipulator.
#[derive(Debug)]
pub struct GraspDriver {
    solver: GraspAttachmentSolver,
    stabilizer: AttachmentStabilizer,

    /// The manipulator's own colliders, disabled while holding
    colliders: Vec<ShapeId>,

    session: Option<GraspSession>,
    attach: AttachNode,
    subscription: Option<Subscription>,

    /// Object held with its authored attach pose
    authored: Option<ObjectId>,

    next_session: u64,
    metrics: GraspMetrics,
    last_outcome: Option<SolveOutcome>,
}

impl GraspDriver {
    /// Creates a driver. `colliders` are the manipulator's own shapes.
    pub fn new(config: &HandConfig, colliders: Vec<ShapeId>) -> Self {
        Self {
            solver: GraspAttachmentSolver::new(config.grasp),
            stabilizer: AttachmentStabilizer::new(config.stabilizer),
            colliders,
            session: None,
            attach: AttachNode::new(),
            subscription: None,
            authored: None,
            next_session: 0,
            metrics: GraspMetrics::default(),
            last_outcome: None,
        }
    }

    /// Subscribes to `source`, replacing any earlier subscription.
    pub fn attach(&mut self, source: &mut dyn SelectionSource) {
        if let Some(old) = self.subscription.take() {
            source.unsubscribe(old.id());
        }
        let subscription = source.subscribe();
        debug!(subscription = subscription.id().0, "grasp driver subscribed");
        self.subscription = Some(subscription);
    }

    /// Unsubscribes from `source`. Events already queued are dropped.
    pub fn detach(&mut self, source: &mut dyn SelectionSource) {
        if let Some(subscription) = self.subscription.take() {
            source.unsubscribe(subscription.id());
            debug!(subscription = subscription.id().0, "grasp driver unsubscribed");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Drains and handles every queued selection event.
    pub fn process_events(
        &mut self,
        frame: &FrameState,
        pinch: &mut PinchGestureDriver,
        geometry: &mut dyn GeometryQuery,
    ) -> Vec<GraspEvent> {
        let queued = match self.subscription.as_mut() {
            Some(subscription) => subscription.drain(),
            None => return Vec::new(),
        };

        queued
            .into_iter()
            .map(|event| match event {
                SelectionEvent::GraspBegin(object) => self.on_grasp_begin(object, frame, pinch, geometry),
                SelectionEvent::GraspEnd { object } => self.on_grasp_end(object, pinch, geometry),
            })
            .collect()
    }

    /// Starts a grasp of `object`, replacing any live session.
    pub fn on_grasp_begin(
        &mut self,
        object: GrabbedObject,
        frame: &FrameState,
        pinch: &mut PinchGestureDriver,
        geometry: &mut dyn GeometryQuery,
    ) -> GraspEvent {
        self.authored = None;

        if object.authored_attach.is_some() && !self.solver.config().ignore_authored_attach_poses {
            if let Some(previous) = self.release_session(pinch, geometry) {
                warn!(
                    previous = %previous.id(),
                    object = %object.id,
                    "authored attach while holding, releasing session"
                );
            }
            debug!(object = %object.id, "keeping authored attach pose");
            self.metrics.authored_skips += 1;
            self.authored = Some(object.id);
            return GraspEvent::AuthoredAttach { object: object.id };
        }

        pinch.begin_pinch();
        for &collider in &self.colliders {
            geometry.set_enabled(collider, false);
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let object_id = object.id;

        if let Some(previous) = self.session.take() {
            warn!(
                previous = %previous.id(),
                session = %id,
                "grasp began while holding, replacing session"
            );
        }

        let mut session = GraspSession::new(id, object, frame.now);
        let outcome = self.solver.solve(&mut session, &frame.tips, &frame.manipulator, &*geometry);
        self.session = Some(session);
        self.apply(outcome, &frame.manipulator);

        if self.stabilizer.start(id, frame.now).is_some() {
            self.metrics.stabilizer_cancelled += 1;
        }
        self.metrics.grasps_started += 1;

        info!(session = %id, object = %object_id, "grasp began");
        GraspEvent::Began {
            session: id,
            object: object_id,
        }
    }

    /// Ends the grasp of `object`. No-op unless it is the held object.
    pub fn on_grasp_end(
        &mut self,
        object: ObjectId,
        pinch: &mut PinchGestureDriver,
        geometry: &mut dyn GeometryQuery,
    ) -> GraspEvent {
        let held = self.session.as_ref().map(|s| s.object().id);
        if held != Some(object) {
            if self.authored == Some(object) {
                self.authored = None;
                debug!(%object, "released authored attach");
                return GraspEvent::AuthoredReleased { object };
            }
            debug!(%object, held = ?held, "grasp end for an object not held, ignoring");
            self.metrics.ignored_releases += 1;
            return GraspEvent::IgnoredRelease { object };
        }

        let Some(session) = self.release_session(pinch, geometry) else {
            return GraspEvent::IgnoredRelease { object };
        };

        info!(session = %session.id(), %object, solves = session.solve_count(), "grasp ended");
        GraspEvent::Released {
            session: session.id(),
            object,
        }
    }

    /// Polls the stabilizer once and applies a pending re-solve.
    pub fn tick_stabilizer(
        &mut self,
        frame: &FrameState,
        geometry: &dyn GeometryQuery,
    ) -> (StabilizerPoll, Option<GraspEvent>) {
        let live = self.session.as_ref().map(|s| s.id());
        let poll = self.stabilizer.poll(frame.now, live, &frame.tips);

        let event = match poll {
            StabilizerPoll::Resolve(id) => {
                let outcome = self.session.as_mut().filter(|s| s.id() == id).map(|session| {
                    session.set_contact_shape(None);
                    self.solver.solve(session, &frame.tips, &frame.manipulator, geometry)
                });
                outcome.map(|outcome| {
                    self.apply(outcome, &frame.manipulator);
                    self.metrics.stabilizer_resolves += 1;
                    debug!(session = %id, "attach frame re-solved");
                    GraspEvent::Resolved { session: id }
                })
            }
            StabilizerPoll::Cancelled(id) => {
                self.metrics.stabilizer_cancelled += 1;
                Some(GraspEvent::StabilizerCancelled { session: id })
            }
            StabilizerPoll::Idle | StabilizerPoll::Waiting => None,
        };

        (poll, event)
    }

    /// Drops the live session: ends the pinch, restores the colliders and
    /// resets the attach node.
    fn release_session(
        &mut self,
        pinch: &mut PinchGestureDriver,
        geometry: &mut dyn GeometryQuery,
    ) -> Option<GraspSession> {
        let session = self.session.take()?;

        pinch.end_pinch();
        for &collider in &self.colliders {
            geometry.set_enabled(collider, true);
        }
        self.attach.reset();
        self.metrics.grasps_released += 1;
        Some(session)
    }

    fn apply(&mut self, outcome: SolveOutcome, manipulator: &Manipulator) {
        self.attach.set_world(&manipulator.pose, &outcome.frame);
        self.metrics.record_solve(&outcome);
        self.last_outcome = Some(outcome);
    }

    pub fn session(&self) -> Option<&GraspSession> {
        self.session.as_ref()
    }

    pub fn attach_node(&self) -> &AttachNode {
        &self.attach
    }

    pub fn metrics(&self) -> &GraspMetrics {
        &self.metrics
    }

    /// Diagnostics of the most recent solve.
    pub fn last_outcome(&self) -> Option<&SolveOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn stabilizer(&self) -> &AttachmentStabilizer {
        &self.stabilizer
    }

    pub fn colliders(&self) -> &[ShapeId] {
        &self.colliders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AttachFrame;
    use crate::test_support::SphereScene;
    use approx::assert_relative_eq;
    use handgrasp_env::SelectionBus;
    use nalgebra::{Isometry3, Point3};

    const TICK: Duration = Duration::from_nanos(11_111_111);

    struct Rig {
        bus: SelectionBus,
        scene: SphereScene,
        driver: GraspDriver,
        pinch: PinchGestureDriver,
        ball: ShapeId,
        palm: ShapeId,
    }

    fn rig(config: HandConfig) -> Rig {
        let mut scene = SphereScene::new();
        let ball = scene.add_sphere(Point3::new(0.0, 0.0, 0.5), 0.1);
        let palm = scene.add_sphere(Point3::new(0.0, -0.3, 0.0), 0.04);
        let mut bus = SelectionBus::new();
        let mut driver = GraspDriver::new(&config, vec![palm]);
        driver.attach(&mut bus);
        Rig {
            bus,
            scene,
            driver,
            pinch: PinchGestureDriver::new(),
            ball,
            palm,
        }
    }

    fn frame(now: Duration, separation: f64) -> FrameState {
        let half = separation / 2.0;
        FrameState {
            now,
            tips: FingertipPair::new(Point3::new(half, 0.0, 0.35), Point3::new(-half, 0.0, 0.35)),
            manipulator: Manipulator::new(Isometry3::translation(0.0, 0.0, 0.2)),
        }
    }

    impl Rig {
        fn cycle(&mut self, frame: &FrameState) -> (Vec<GraspEvent>, StabilizerPoll) {
            let mut events = self.driver.process_events(frame, &mut self.pinch, &mut self.scene);
            let (poll, event) = self.driver.tick_stabilizer(frame, &self.scene);
            events.extend(event);
            (events, poll)
        }

        fn ball_object(&self) -> GrabbedObject {
            GrabbedObject::new(ObjectId::from_seed(1), vec![self.ball])
        }
    }

    #[test]
    fn test_open_grip_resolves_once_at_timeout() {
        let mut rig = rig(HandConfig::default());
        let object = rig.ball_object();
        rig.bus.emit(SelectionEvent::GraspBegin(object));

        let mut now = Duration::ZERO;
        let mut resolves = Vec::new();
        for _ in 0..30 {
            let (events, _) = rig.cycle(&frame(now, 0.05));
            if events.iter().any(|e| matches!(e, GraspEvent::Resolved { .. })) {
                resolves.push(now);
            }
            now += TICK;
        }

        assert_eq!(resolves.len(), 1);
        assert!(resolves[0] >= Duration::from_millis(80));
        assert!(resolves[0] < Duration::from_millis(80) + TICK);

        let session = rig.driver.session().unwrap();
        assert_eq!(session.solve_count(), 2);
        assert_eq!(rig.driver.metrics().stabilizer_resolves, 1);
        assert!(rig.pinch.is_active());
        assert!(!rig.scene.is_enabled(rig.palm));
    }

    #[test]
    fn test_release_before_settle_skips_resolve() {
        let mut rig = rig(HandConfig::default());
        let object = rig.ball_object();
        let object_id = object.id;
        rig.bus.emit(SelectionEvent::GraspBegin(object));

        let (events, poll) = rig.cycle(&frame(Duration::ZERO, 0.05));
        assert!(matches!(events[0], GraspEvent::Began { .. }));
        assert_eq!(poll, StabilizerPoll::Waiting);
        assert!(!rig.driver.attach_node().is_identity());

        rig.bus.emit(SelectionEvent::GraspEnd { object: object_id });
        let (events, poll) = rig.cycle(&frame(TICK * 3, 0.05));

        assert!(matches!(events[0], GraspEvent::Released { object, .. } if object == object_id));
        assert!(matches!(poll, StabilizerPoll::Cancelled(_)));
        assert!(rig.driver.session().is_none());
        assert!(rig.driver.attach_node().is_identity());
        assert!(!rig.pinch.is_active());
        assert!(rig.scene.is_enabled(rig.palm));
        assert_eq!(rig.driver.metrics().stabilizer_resolves, 0);
        assert_eq!(rig.driver.metrics().solves, 1);
    }

    #[test]
    fn test_closed_grip_resolves_in_first_cycle() {
        let mut rig = rig(HandConfig::default());
        rig.bus.emit(SelectionEvent::GraspBegin(rig.ball_object()));

        let (events, poll) = rig.cycle(&frame(Duration::ZERO, 0.01));
        assert!(matches!(poll, StabilizerPoll::Resolve(_)));
        assert_eq!(events.len(), 2);
        assert_eq!(rig.driver.session().unwrap().solve_count(), 2);
    }

    #[test]
    fn test_attach_node_holds_solved_frame() {
        let mut rig = rig(HandConfig::default());
        rig.bus.emit(SelectionEvent::GraspBegin(rig.ball_object()));
        let state = frame(Duration::ZERO, 0.05);
        rig.cycle(&state);

        let solved: AttachFrame = *rig.driver.session().unwrap().frame();
        let world = rig.driver.attach_node().world(&state.manipulator.pose);
        assert_relative_eq!(world.translation.vector, solved.position.coords, epsilon = 1e-12);
        assert_relative_eq!(solved.position, Point3::new(0.0, 0.0, 0.394), epsilon = 1e-9);
    }

    #[test]
    fn test_end_for_other_object_is_ignored() {
        let mut rig = rig(HandConfig::default());
        rig.bus.emit(SelectionEvent::GraspBegin(rig.ball_object()));
        rig.cycle(&frame(Duration::ZERO, 0.05));

        rig.bus.emit(SelectionEvent::GraspEnd {
            object: ObjectId::from_seed(99),
        });
        let (events, _) = rig.cycle(&frame(TICK, 0.05));

        assert!(matches!(events[0], GraspEvent::IgnoredRelease { .. }));
        assert!(rig.driver.session().is_some());
        assert!(rig.pinch.is_active());
        assert_eq!(rig.driver.metrics().ignored_releases, 1);
    }

    #[test]
    fn test_end_without_session_is_noop() {
        let mut rig = rig(HandConfig::default());
        rig.bus.emit(SelectionEvent::GraspEnd {
            object: ObjectId::from_seed(1),
        });
        let (events, poll) = rig.cycle(&frame(Duration::ZERO, 0.05));

        assert!(matches!(events[0], GraspEvent::IgnoredRelease { .. }));
        assert_eq!(poll, StabilizerPoll::Idle);
        assert!(rig.scene.is_enabled(rig.palm));
    }

    #[test]
    fn test_regrab_supersedes_stabilizer() {
        let mut rig = rig(HandConfig::default());
        rig.bus.emit(SelectionEvent::GraspBegin(rig.ball_object()));
        rig.cycle(&frame(Duration::ZERO, 0.05));

        let second = GrabbedObject::new(ObjectId::from_seed(2), vec![rig.ball]);
        rig.bus.emit(SelectionEvent::GraspBegin(second));
        let (events, _) = rig.cycle(&frame(TICK * 2, 0.05));

        assert!(matches!(events[0], GraspEvent::Began { session: SessionId(1), .. }));
        assert_eq!(rig.driver.stabilizer().pending_session(), Some(SessionId(1)));
        assert_eq!(rig.driver.metrics().stabilizer_cancelled, 1);

        // The replacement's budget counts from its own start.
        let (_, poll) = rig.cycle(&frame(Duration::from_millis(85), 0.05));
        assert_eq!(poll, StabilizerPoll::Waiting);
    }

    #[test]
    fn test_authored_attach_pose_skips_dynamic_attach() {
        let mut config = HandConfig::default();
        config.grasp.ignore_authored_attach_poses = false;
        let mut rig = rig(config);

        let object = rig.ball_object().with_authored_attach(Isometry3::translation(0.0, 0.1, 0.0));
        let object_id = object.id;
        rig.bus.emit(SelectionEvent::GraspBegin(object));
        let (events, poll) = rig.cycle(&frame(Duration::ZERO, 0.05));

        assert_eq!(events, vec![GraspEvent::AuthoredAttach { object: object_id }]);
        assert_eq!(poll, StabilizerPoll::Idle);
        assert!(rig.driver.session().is_none());
        assert!(!rig.pinch.is_active());
        assert!(rig.scene.is_enabled(rig.palm));
        assert_eq!(rig.driver.metrics().authored_skips, 1);

        rig.bus.emit(SelectionEvent::GraspEnd { object: object_id });
        let (events, _) = rig.cycle(&frame(TICK, 0.05));
        assert_eq!(events, vec![GraspEvent::AuthoredReleased { object: object_id }]);
        assert_eq!(rig.driver.metrics().ignored_releases, 0);
    }

    #[test]
    fn test_authored_attach_while_holding_releases_session() {
        let mut config = HandConfig::default();
        config.grasp.ignore_authored_attach_poses = false;
        let mut rig = rig(config);

        let held = rig.ball_object();
        let held_id = held.id;
        let authored = GrabbedObject::new(ObjectId::from_seed(2), vec![rig.ball])
            .with_authored_attach(Isometry3::translation(0.0, 0.1, 0.0));
        let authored_id = authored.id;

        rig.bus.emit(SelectionEvent::GraspBegin(held));
        rig.bus.emit(SelectionEvent::GraspBegin(authored));
        rig.bus.emit(SelectionEvent::GraspEnd { object: authored_id });
        let (events, poll) = rig.cycle(&frame(Duration::ZERO, 0.05));

        assert_eq!(
            events,
            vec![
                GraspEvent::Began { session: SessionId(0), object: held_id },
                GraspEvent::AuthoredAttach { object: authored_id },
                GraspEvent::AuthoredReleased { object: authored_id },
                GraspEvent::StabilizerCancelled { session: SessionId(0) },
            ]
        );
        assert_eq!(poll, StabilizerPoll::Cancelled(SessionId(0)));
        assert!(rig.driver.session().is_none());
        assert!(!rig.pinch.is_active());
        assert!(rig.scene.is_enabled(rig.palm));
        assert!(rig.driver.attach_node().is_identity());
        assert_eq!(rig.driver.metrics().grasps_released, 1);

        // A late end for the replaced object is ignored
        rig.bus.emit(SelectionEvent::GraspEnd { object: held_id });
        let (events, _) = rig.cycle(&frame(TICK, 0.05));
        assert_eq!(events, vec![GraspEvent::IgnoredRelease { object: held_id }]);
    }

    #[test]
    fn test_authored_pose_ignored_by_default() {
        let mut rig = rig(HandConfig::default());
        let object = rig.ball_object().with_authored_attach(Isometry3::identity());
        rig.bus.emit(SelectionEvent::GraspBegin(object));
        let (events, _) = rig.cycle(&frame(Duration::ZERO, 0.05));
        assert!(matches!(events[0], GraspEvent::Began { .. }));
    }

    #[test]
    fn test_detach_stops_event_delivery() {
        let mut rig = rig(HandConfig::default());
        rig.driver.detach(&mut rig.bus);
        assert!(!rig.driver.is_attached());
        assert_eq!(rig.bus.subscriber_count(), 0);

        rig.bus.emit(SelectionEvent::GraspBegin(rig.ball_object()));
        let (events, _) = rig.cycle(&frame(Duration::ZERO, 0.05));
        assert!(events.is_empty());
        assert!(rig.driver.session().is_none());
    }
}
