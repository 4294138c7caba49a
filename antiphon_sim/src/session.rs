//! Free-running sessions loaded from persisted state.

use crate::error::SimError;
use crate::exporter::SimExport;
use crate::pace::Pacer;
use crate::world::{SimConfig, SimWorld};
use antiphon_core::SessionState;
use antiphon_env::{AntiphonContext, TokioContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Reads session state JSON from a file.
pub fn load_state(path: &str) -> Result<SessionState, SimError> {
    let text = std::fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.to_string(),
        source,
    })?;
    Ok(SessionState::from_json(&text)?)
}

/// Builds a world from `state`, starts the selected player and runs it
/// for `span`. With `realtime` the run is paced on the wall clock,
/// otherwise on the world's virtual clock.
pub async fn play_session(
    config: SimConfig,
    state: &SessionState,
    span: Duration,
    realtime: bool,
) -> Result<SimWorld, SimError> {
    let mut world = SimWorld::new(config);
    let report = world.kit.apply_state(state);
    info!(
        "Loaded {} players ({} rejected)",
        world.player_count(),
        report.rejected.len()
    );
    
    let starter = world.kit.play().ok_or(SimError::NoStarter)?;
    info!("{} starts the session", starter);
    
    let dispatched = if realtime {
        pace(TokioContext::shared(), &mut world, span).await
    } else {
        pace(world.context.clone(), &mut world, span).await
    };
    world.sync_clock();
    info!("Dispatched {} tasks in {:.1}s", dispatched, world.kit.now().as_secs_f64());
    Ok(world)
}

/// Captures a finished session. It passes if nothing was reported.
pub fn export_session(world: &SimWorld) -> SimExport {
    let mut export = SimExport::capture("session", world);
    let errors = world.reporter.messages();
    export.finalize(errors.is_empty(), errors.first().cloned());
    export
}

async fn pace<C: AntiphonContext>(context: Arc<C>, world: &mut SimWorld, span: Duration) -> usize {
    let pacer = Pacer::new(context, &world.kit);
    pacer.run_for(&mut world.kit, span).await
}
