//! Simulation context implementing AntiphonContext for deterministic runs.

use antiphon_env::AntiphonContext;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Virtual clock for driving a kit without waiting on wall time.
///
/// `sleep` does not wait: it moves the virtual clock forward by the
/// requested amount, so paced runs finish instantly and identically.
/// Clones share the same clock.
#[derive(Debug, Clone)]
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,
    
    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }
    
    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }
    
    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        if let Ok(mut time) = self.virtual_time_ns.lock() {
            *time = time.saturating_add(duration.as_nanos() as u64);
        }
    }
    
    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        if let Ok(mut time) = self.virtual_time_ns.lock() {
            *time = time_ns;
        }
    }
    
    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.lock().map(|t| *t).unwrap_or(0)
    }
}

#[async_trait]
impl AntiphonContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }
    
    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
    }
    
    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);
        
        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));
        
        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
        
        ctx.set_time(0);
        assert_eq!(ctx.time_ns(), 0);
    }
    
    #[test]
    fn test_clones_share_the_clock() {
        let ctx = SimContext::new(7);
        let other = ctx.clone();
        other.advance_time(Duration::from_secs(2));
        assert_eq!(ctx.now(), Duration::from_secs(2));
        assert_eq!(other.seed(), 7);
    }
    
    #[tokio::test]
    async fn test_sleep_advances_virtual_time() {
        let ctx = SimContext::shared(1);
        ctx.sleep(Duration::from_secs(3600)).await;
        assert_eq!(ctx.now(), Duration::from_secs(3600));
    }
}
