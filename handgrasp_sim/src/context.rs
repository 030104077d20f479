//! Virtual clock for deterministic runs.

use async_trait::async_trait;
use handgrasp_env::HandContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// `HandContext` whose time only moves when the simulation says so.
///
/// Clones share the clock, so a harness can hold one handle while the
/// runtime holds another.
#[derive(Debug, Clone)]
pub struct SimContext {
    seed: u64,

    /// Nanoseconds since simulation start
    virtual_time_ns: Arc<AtomicU64>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Moves the clock forward by `duration`.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl HandContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.virtual_time_ns.load(Ordering::SeqCst))
    }

    async fn wait_frame(&self, dt: Duration) {
        // A frame wait is the only thing that moves time
        self.advance_time(dt);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
