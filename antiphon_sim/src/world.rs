//! SimWorld - a kit wired to recording collaborators and a virtual clock.

use crate::context::SimContext;
use antiphon_core::{Kit, KitConfig, PlayerRecord, Position, RecordPosition, RosterError, UiState};
use antiphon_env::{AntiphonContext, CollectingReporter, PlayerId, RecordingSink};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How spawned players are placed on the board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Layout {
    /// Evenly spaced on a circle around the origin
    Ring { radius: f64 },
    
    /// Normally distributed around the origin
    Scatter { spread: f64 },
    
    /// Along the x axis, `spacing` apart
    Line { spacing: f64 },
}

impl Layout {
    /// Positions for `count` players. Scatter draws from `rng`.
    pub fn positions(&self, count: usize, rng: &mut ChaCha8Rng) -> Vec<Position> {
        match *self {
            Layout::Ring { radius } => (0..count)
                .map(|i| {
                    let angle = TAU * i as f64 / count.max(1) as f64;
                    Position::new(radius * angle.cos(), radius * angle.sin())
                })
                .collect(),
            Layout::Scatter { spread } => match Normal::new(0.0, spread.abs()) {
                Ok(normal) => (0..count)
                    .map(|_| Position::new(normal.sample(rng), normal.sample(rng)))
                    .collect(),
                Err(e) => {
                    warn!("Bad scatter spread {}: {}", spread, e);
                    vec![Position::default(); count]
                }
            },
            Layout::Line { spacing } => (0..count)
                .map(|i| Position::new(spacing * i as f64, 0.0))
                .collect(),
        }
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,
    
    /// Number of players to spawn
    pub num_players: usize,
    
    pub layout: Layout,
    
    /// Propagation delay per unit of distance
    pub ms_per_unit: f64,
    
    /// Evaluation window given to spawned players
    pub window_size: usize,
    
    /// Strategy names given to spawned players
    pub strategies: Vec<String>,
    
    /// Most events one response is built from
    pub max_response_events: usize,
    
    /// Maximum simulation duration in seconds
    pub max_duration_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_players: 4,
            layout: Layout::Ring { radius: 5.0 },
            ms_per_unit: 100.0,
            window_size: 4,
            strategies: vec!["echo".to_string()],
            max_response_events: 8,
            max_duration_secs: 60.0,
        }
    }
}

impl SimConfig {
    /// Kit settings for this run. The journal is always on.
    pub fn kit_config(&self) -> KitConfig {
        KitConfig::default()
            .with_seed(self.seed)
            .with_ms_per_unit(self.ms_per_unit)
            .with_max_response_events(self.max_response_events)
            .with_journal(true)
    }
}

/// The SimWorld - container for one simulated session.
pub struct SimWorld {
    pub config: SimConfig,
    
    /// Shared virtual clock, kept in step with the kit
    pub context: Arc<SimContext>,
    
    pub kit: Kit,
    
    /// Every note the selected player sounded
    pub audio: RecordingSink,
    
    /// Every error the kit reported
    pub reporter: CollectingReporter,
    
    /// Placement RNG, separate from the kit's own
    layout_rng: ChaCha8Rng,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Self {
        // Derive separate seeds for different subsystems
        let layout_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        
        let audio = RecordingSink::new();
        let reporter = CollectingReporter::new();
        let kit = Kit::new(config.kit_config())
            .with_audio(audio.clone())
            .with_reporter(reporter.clone());
        
        Self {
            context: SimContext::shared(config.seed),
            layout_rng: ChaCha8Rng::seed_from_u64(layout_seed),
            config,
            kit,
            audio,
            reporter,
        }
    }
    
    /// Spawns the configured players, selects the first and returns
    /// their ids in roster order.
    pub fn spawn_players(&mut self) -> Result<Vec<PlayerId>, RosterError> {
        let positions = self
            .config
            .layout
            .positions(self.config.num_players, &mut self.layout_rng);
        
        let mut ids = Vec::with_capacity(positions.len());
        for (i, position) in positions.into_iter().enumerate() {
            let id = self.kit.add_player()?;
            let record = PlayerRecord {
                position: Some(RecordPosition {
                    x: position.x,
                    y: position.y,
                }),
                ui_state: Some(UiState { selected: i == 0 }),
                sample_index: Some((i % self.kit.config().sample_files.len().max(1)) as f64),
                evaluation_window_size_in_events: Some(self.config.window_size as f64),
                response_strategy_names: Some(self.config.strategies.clone()),
                ..PlayerRecord::with_id(id.to_string())
            };
            let report = self.kit.update_roster(&[record]);
            if let Some(error) = report.rejected.into_iter().next() {
                return Err(error);
            }
            debug!("Spawned {} at ({:.2}, {:.2})", id, position.x, position.y);
            ids.push(id);
        }
        Ok(ids)
    }
    
    /// Places a player explicitly.
    pub fn place(&mut self, id: &str, x: f64, y: f64) -> PlayerId {
        let record = PlayerRecord {
            position: Some(RecordPosition { x, y }),
            evaluation_window_size_in_events: Some(self.config.window_size as f64),
            response_strategy_names: Some(self.config.strategies.clone()),
            ..PlayerRecord::with_id(id)
        };
        self.kit.update_roster(&[record]);
        PlayerId::from(id)
    }
    
    /// Runs the kit forward by `span` and moves the virtual clock with it.
    pub fn advance(&mut self, span: Duration) -> usize {
        let dispatched = self.kit.run_for(span);
        self.sync_clock();
        dispatched
    }
    
    /// Runs the kit up to `deadline` and moves the virtual clock with it.
    pub fn run_until(&mut self, deadline: Duration) -> usize {
        let dispatched = self.kit.run_until(deadline);
        self.sync_clock();
        dispatched
    }
    
    /// Moves the virtual clock to the kit's session time.
    pub fn sync_clock(&self) {
        self.context.set_time(self.kit.now().as_nanos() as u64);
    }
    
    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }
    
    pub fn player_count(&self) -> usize {
        self.kit.roster().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_sim_world_creation() {
        let config = SimConfig {
            num_players: 3,
            ..Default::default()
        };
        
        let mut world = SimWorld::new(config);
        let ids = world.spawn_players().unwrap();
        
        assert_eq!(ids.len(), 3);
        assert_eq!(world.player_count(), 3);
        assert!(world.kit.player(&ids[0]).unwrap().selected);
        assert!(!world.kit.player(&ids[1]).unwrap().selected);
    }
    
    #[test]
    fn test_ring_layout_is_evenly_spaced() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let ring = Layout::Ring { radius: 5.0 }.positions(4, &mut rng);
        
        for position in &ring {
            assert!((position.distance(&Position::default()) - 5.0).abs() < 1e-9);
        }
        assert!((ring[0].distance(&ring[2]) - 10.0).abs() < 1e-9);
    }
    
    #[test]
    fn test_sim_world_advance_moves_clock() {
        let mut world = SimWorld::new(SimConfig::default());
        world.spawn_players().unwrap();
        
        world.advance(Duration::from_millis(1500));
        assert!((world.time() - 1.5).abs() < 1e-9);
    }
    
    #[test]
    fn test_sim_world_determinism() {
        let config = SimConfig {
            layout: Layout::Scatter { spread: 10.0 },
            ..Default::default()
        };
        
        let mut world1 = SimWorld::new(config.clone());
        let mut world2 = SimWorld::new(config);
        let ids1 = world1.spawn_players().unwrap();
        let ids2 = world2.spawn_players().unwrap();
        
        assert_eq!(ids1, ids2);
        assert_eq!(world1.kit.roster().records(), world2.kit.roster().records());
    }
}
