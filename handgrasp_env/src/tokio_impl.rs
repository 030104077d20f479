//! Wall-clock implementation of HandContext using Tokio.

use crate::HandContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Wall-clock context that paces frames on a fixed schedule.
///
/// `wait_frame` sleeps until the next deadline rather than for a flat `dt`,
/// so time spent inside a tick does not accumulate as drift. A caller that
/// falls behind returns immediately and the schedule restarts from now.
pub struct TokioContext {
    start: Instant,

    /// Next frame deadline, nanoseconds since `start`
    next_frame_ns: AtomicU64,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            next_frame_ns: AtomicU64::new(0),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn elapsed_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HandContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn wait_frame(&self, dt: Duration) {
        let now = self.elapsed_ns();
        let scheduled = self.next_frame_ns.load(Ordering::Acquire);
        let deadline = scheduled.saturating_add(dt.as_nanos() as u64).max(now);
        self.next_frame_ns.store(deadline, Ordering::Release);

        tokio::time::sleep_until(self.start + Duration::from_nanos(deadline)).await;
    }

    fn seed(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_frame_waits_until_deadline() {
        let ctx = TokioContext::new();
        ctx.wait_frame(Duration::from_millis(10)).await;
        assert!(ctx.now() >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_follow_schedule() {
        let ctx = TokioContext::new();
        let dt = Duration::from_millis(10);

        ctx.wait_frame(dt).await;
        // Work inside the frame eats into the next wait
        tokio::time::advance(Duration::from_millis(4)).await;
        ctx.wait_frame(dt).await;

        assert_eq!(ctx.now(), Duration::from_millis(20));
        assert_eq!(ctx.seed(), 0);
    }
}
