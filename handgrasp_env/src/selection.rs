//! Selection event source abstraction (grasp-begin / grasp-end).

use crate::types::{ObjectId, ShapeId};
use nalgebra::Isometry3;
use tokio::sync::mpsc;
use tracing::trace;

/// The object handed over by a grasp-begin event.
#[derive(Debug, Clone, PartialEq)]
pub struct GrabbedObject {
    /// Object identity
    pub id: ObjectId,

    /// Collision shapes belonging to the object (enabled or not)
    pub shapes: Vec<ShapeId>,

    /// Attach pose authored on the object itself, if any
    pub authored_attach: Option<Isometry3<f64>>,
}

impl GrabbedObject {
    /// Creates an object without an authored attach pose.
    pub fn new(id: ObjectId, shapes: Vec<ShapeId>) -> Self {
        Self {
            id,
            shapes,
            authored_attach: None,
        }
    }

    /// Sets the authored attach pose.
    pub fn with_authored_attach(mut self, pose: Isometry3<f64>) -> Self {
        self.authored_attach = Some(pose);
        self
    }
}

/// Events raised by the selection/interaction layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    /// The manipulator started holding an object.
    GraspBegin(GrabbedObject),

    /// The manipulator released `object`.
    GraspEnd { object: ObjectId },
}

/// Identifies a listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A registered listener. Events are queued until drained by the owner.
///
/// ```text
/// Interaction layer          SelectionBus            GraspDriver
///   |                           |                        |
///   |-- emit(GraspBegin) ------>|                        |
///   |                           |-- [unbounded queue] -->|
///   |                           |                        |-- drain() once per frame
/// ```
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<SelectionEvent>,
}

impl Subscription {
    /// Returns the registration id (pass it back to `unsubscribe`).
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Takes the next queued event without waiting.
    pub fn try_next(&mut self) -> Option<SelectionEvent> {
        self.events.try_recv().ok()
    }

    /// Takes every queued event, in emission order.
    pub fn drain(&mut self) -> Vec<SelectionEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.try_next() {
            out.push(event);
        }
        out
    }

    /// Waits for the next event. Returns `None` once the source dropped the
    /// registration.
    pub async fn next(&mut self) -> Option<SelectionEvent> {
        self.events.recv().await
    }
}

/// Registration interface of a selection event source.
pub trait SelectionSource {
    /// Registers a new listener.
    fn subscribe(&mut self) -> Subscription;

    /// Removes a listener. Unknown ids are ignored.
    fn unsubscribe(&mut self, id: SubscriptionId);
}

/// In-process selection source broadcasting to every subscriber.
#[derive(Debug, Default)]
pub struct SelectionBus {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<SelectionEvent>)>,
}

impl SelectionBus {
    /// Creates a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts an event and returns how many listeners received it.
    ///
    /// Listeners whose `Subscription` was dropped are pruned.
    pub fn emit(&mut self, event: SelectionEvent) -> usize {
        self.subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
        trace!(listeners = self.subscribers.len(), ?event, "selection event emitted");
        self.subscribers.len()
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl SelectionSource for SelectionBus {
    fn subscribe(&mut self) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push((id, tx));

        Subscription { id, events: rx }
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }
}
