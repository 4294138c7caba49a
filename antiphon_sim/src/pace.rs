//! Pacing: dispatching a kit's tasks against an outside clock.
//!
//! The kit's own clock only jumps from task to task. A [`Pacer`] makes
//! those jumps line up with an [`AntiphonContext`]: it sleeps on the
//! context until the next task is due, then dispatches it. With a
//! `TokioContext` that is real time; with a `SimContext` the sleeps are
//! instant and the run stays deterministic.

use antiphon_core::Kit;
use antiphon_env::AntiphonContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Drives a kit in step with a context clock.
pub struct Pacer<C: AntiphonContext> {
    context: Arc<C>,
    
    /// Context time matching `kit_origin`
    origin: Duration,
    
    kit_origin: Duration,
}

impl<C: AntiphonContext> Pacer<C> {
    /// Anchors the kit's current time to the context's current time.
    pub fn new(context: Arc<C>, kit: &Kit) -> Self {
        Self {
            origin: context.now(),
            kit_origin: kit.now(),
            context,
        }
    }
    
    /// Context time at which kit time `at` should be dispatched.
    pub fn deadline_for(&self, at: Duration) -> Duration {
        self.origin + at.saturating_sub(self.kit_origin)
    }
    
    /// Dispatches every task up to kit time `until`, sleeping between
    /// them. Returns the number of tasks dispatched.
    pub async fn run_until(&self, kit: &mut Kit, until: Duration) -> usize {
        let mut dispatched = 0;
        loop {
            let target = match kit.next_due() {
                Some(due) if due <= until => due.max(kit.now()),
                _ => until,
            };
            
            let wait = self.deadline_for(target).saturating_sub(self.context.now());
            if !wait.is_zero() {
                self.context.sleep(wait).await;
            }
            dispatched += kit.run_until(target);
            
            if target >= until {
                break;
            }
        }
        debug!("Paced run reached {:?} ({} tasks)", until, dispatched);
        dispatched
    }
    
    /// Runs the kit forward by `span` of kit time.
    pub async fn run_for(&self, kit: &mut Kit, span: Duration) -> usize {
        let until = kit.now() + span;
        self.run_until(kit, until).await
    }
}
