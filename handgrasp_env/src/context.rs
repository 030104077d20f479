//! Core clock trait for HandGrasp runtimes.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for frame timing.
///
/// This trait abstracts the "real world" clock so that the HandGrasp core can
/// run in both production (tokio) and simulation (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `std::time::Instant` and `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock advanced per tick
///
/// # Determinism
///
/// The stabilizer measures its settling window against `now()`, so in
/// simulation every timing decision is reproducible from the tick sequence.
#[async_trait]
pub trait HandContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends until the next frame is due.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock by `dt`
    async fn wait_frame(&self, dt: Duration);

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
