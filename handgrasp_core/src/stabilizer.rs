//! Delayed re-solve after the grip settles.
//!
//! The first attach frame is solved the instant a grasp begins, usually
//! before the fingers have closed on the object. The stabilizer waits,
//! polled once per cycle, until the fingertips close, the time budget runs
//! out, or the grasp ends, and then asks for exactly one re-solve.
//!
//! There is at most one pending task per manipulator. Starting a new one
//! replaces the old; a task whose session is no longer live cancels itself
//! on its next poll.

use crate::config::StabilizerConfig;
use crate::grasp_solver::FingertipPair;
use crate::session::SessionId;
use std::time::Duration;
use tracing::{debug, trace};

/// What the caller should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizerPoll {
    /// No task pending
    Idle,
    /// Still waiting for the grip to settle
    Waiting,
    /// Re-select the contact shape and re-solve this session
    Resolve(SessionId),
    /// The session ended first; nothing to do
    Cancelled(SessionId),
}

#[derive(Debug, Clone, Copy)]
struct PendingResolve {
    session: SessionId,
    started_at: Duration,
}

/// Single-flight, cycle-polled settle timer.
#[derive(Debug, Clone)]
pub struct AttachmentStabilizer {
    config: StabilizerConfig,
    pending: Option<PendingResolve>,
}

impl AttachmentStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            pending: None,
        }
    }

    /// Starts a task for `session`. Returns the session of the task it
    /// replaced, if any.
    pub fn start(&mut self, session: SessionId, now: Duration) -> Option<SessionId> {
        let replaced = self
            .pending
            .replace(PendingResolve {
                session,
                started_at: now,
            })
            .map(|p| p.session);

        if let Some(old) = replaced {
            debug!(%old, new = %session, "stabilizer superseded");
        }
        replaced
    }

    /// Advances the pending task by one cycle.
    ///
    /// `live` is the session currently held by the manipulator. Missing
    /// fingertips count as an open pinch.
    pub fn poll(&mut self, now: Duration, live: Option<SessionId>, tips: &FingertipPair) -> StabilizerPoll {
        let Some(pending) = self.pending else {
            return StabilizerPoll::Idle;
        };

        let alive = live == Some(pending.session);
        let open = tips.distance().map_or(true, |d| d > self.config.pinch_distance);
        let elapsed = now.saturating_sub(pending.started_at);

        if alive && open && elapsed < self.config.timeout() {
            return StabilizerPoll::Waiting;
        }

        self.pending = None;
        if alive {
            trace!(
                session = %pending.session,
                elapsed_ms = elapsed.as_secs_f64() * 1e3,
                closed = !open,
                "stabilizer resolving"
            );
            StabilizerPoll::Resolve(pending.session)
        } else {
            trace!(session = %pending.session, "stabilizer cancelled");
            StabilizerPoll::Cancelled(pending.session)
        }
    }

    /// Drops the pending task without resolving.
    pub fn cancel(&mut self) -> Option<SessionId> {
        self.pending.take().map(|p| p.session)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Session of the pending task.
    pub fn pending_session(&self) -> Option<SessionId> {
        self.pending.map(|p| p.session)
    }
}
