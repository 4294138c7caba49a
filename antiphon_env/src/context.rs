//! Core environment context trait for Antiphon drivers.

use async_trait::async_trait;
use std::time::Duration;

/// The interface to the outside clock.
///
/// The ensemble core keeps its own simulated time; a context is what a
/// driver uses to decide *when* to dispatch the next scheduled task.
///
/// # Implementations
///
/// - **Real time**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` (in `antiphon_sim`) - virtual clock
#[async_trait]
pub trait AntiphonContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    fn now(&self) -> Duration;
    
    /// Suspends execution for the given duration.
    ///
    /// In real time: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);
    
    /// Returns the context's seed (for logging/debugging).
    ///
    /// Real-time contexts are not seeded and return 0.
    fn seed(&self) -> u64;
}
