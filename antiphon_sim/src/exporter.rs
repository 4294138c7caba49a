//! JSON exporter for offline inspection of a run.
//!
//! Exports the final board, every delivery and every sounded note.

use crate::world::SimWorld;
use antiphon_core::Delivery;
use antiphon_env::PlayRequest;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A player as it stood at the end of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub selected: bool,
    
    /// Events heard and not yet answered
    pub window_len: usize,
}

/// One delivery, flattened for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub time_sec: f64,
    pub sender: String,
    pub recipient: String,
    pub pitch: f64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub meta: String,
    pub responded: bool,
}

impl From<&Delivery> for DeliveryRecord {
    fn from(delivery: &Delivery) -> Self {
        Self {
            time_sec: delivery.at.as_secs_f64(),
            sender: delivery.sender.to_string(),
            recipient: delivery.recipient.to_string(),
            pitch: delivery.pitch,
            meta: delivery.meta_message.clone(),
            responded: delivery.responded,
        }
    }
}

/// One note sent to the audio sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub time_sec: f64,
    pub pitch: f64,
    pub pan: f64,
    pub amp: f64,
    pub sample_index: usize,
    pub duration_sec: f64,
}

impl From<&PlayRequest> for NoteRecord {
    fn from(request: &PlayRequest) -> Self {
        Self {
            time_sec: request.at.as_secs_f64(),
            pitch: request.pitch,
            pan: request.pan,
            amp: request.amp,
            sample_index: request.sample_index,
            duration_sec: request.duration.as_secs_f64(),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,
    
    /// Seed used
    pub seed: u64,
    
    /// Duration in seconds
    pub duration_sec: f64,
    
    pub players: Vec<PlayerSnapshot>,
    
    pub deliveries: Vec<DeliveryRecord>,
    
    pub notes: Vec<NoteRecord>,
    
    /// Messages passed to the error reporter
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
    
    /// Final results
    pub passed: bool,
    
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates an empty export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            players: Vec::new(),
            deliveries: Vec::new(),
            notes: Vec::new(),
            errors: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }
    
    /// Captures everything a world has recorded so far.
    pub fn capture(scenario: &str, world: &SimWorld) -> Self {
        let mut export = Self::new(scenario, world.config.seed);
        export.duration_sec = world.time();
        export.players = world
            .kit
            .roster()
            .iter()
            .map(|p| PlayerSnapshot {
                id: p.id.to_string(),
                label: p.label.clone(),
                x: p.position.x,
                y: p.position.y,
                selected: p.selected,
                window_len: p.window_len(),
            })
            .collect();
        export.deliveries = world.kit.journal().iter().map(DeliveryRecord::from).collect();
        export.notes = world.audio.played().iter().map(NoteRecord::from).collect();
        export.errors = world.reporter.messages();
        export
    }
    
    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }
    
    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SimConfig;
    use std::time::Duration;
    
    #[test]
    fn test_capture_after_play() {
        let mut world = SimWorld::new(SimConfig::default());
        world.spawn_players().unwrap();
        world.kit.play();
        world.advance(Duration::from_secs(3));
        
        let mut export = SimExport::capture("ring", &world);
        export.finalize(true, None);
        
        assert_eq!(export.players.len(), 4);
        assert!(!export.deliveries.is_empty());
        // The selected player sounds its own opening notes.
        assert!(!export.notes.is_empty());
        assert!((export.duration_sec - 3.0).abs() < 1e-9);
        
        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("\"scenario\":\"ring\""));
        assert!(!json.contains("failure_reason"));
    }
}
