//! Scenario runner - executes ensemble scenarios and checks their outcome.

use crate::exporter::SimExport;
use crate::scenarios::ScenarioId;
use crate::world::{Layout, SimConfig, SimWorld};

use antiphon_core::{
    serial_offsets, Delivery, Dispatch, Kit, MusicEvent, PlayerRecord, Position, SessionState,
    Task, HARMONIZE_RATIOS,
};
use antiphon_env::PlayerId;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,
    
    /// Seed used
    pub seed: u64,
    
    /// Whether scenario passed all assertions
    pub passed: bool,
    
    /// Final simulation time in seconds
    pub final_time_secs: f64,
    
    /// Players on the roster at the end
    pub final_player_count: usize,
    
    /// Failure message if any
    pub failure_reason: Option<String>,
    
    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
    
    /// Full capture of the run, when requested
    pub export: Option<SimExport>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    pub broadcasts: u64,
    
    pub deliveries: u64,
    
    /// Deliveries whose recipient had left
    pub dropped_deliveries: u64,
    
    pub responses: u64,
    
    /// Times a full window met a busy player
    pub gated: u64,
    
    pub backlog_dropped: u64,
    
    /// Largest evaluation window observed, in events
    pub max_backlog: usize,
    
    /// Notes sent to the audio sink
    pub notes_sounded: usize,
    
    pub errors_reported: usize,
}

impl ScenarioMetrics {
    fn from_world(world: &SimWorld) -> Self {
        let stats = world.kit.stats();
        Self {
            broadcasts: stats.broadcasts,
            deliveries: stats.deliveries,
            dropped_deliveries: stats.dropped_deliveries,
            responses: stats.responses,
            gated: stats.gated,
            backlog_dropped: stats.backlog_dropped,
            max_backlog: stats.max_backlog,
            notes_sounded: world.audio.len(),
            errors_reported: world.reporter.messages().len(),
        }
    }
}

/// Runs ensemble scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,
    
    /// Number of players for scenarios with a variable board
    num_players: usize,
    
    /// Maximum duration in seconds
    max_duration_secs: f64,
    
    /// Keep a full export in each result
    capture: bool,
}

impl ScenarioRunner {
    pub fn new(seed: u64, num_players: usize) -> Self {
        Self {
            seed,
            num_players: num_players.max(2),
            max_duration_secs: 30.0,
            capture: false,
        }
    }
    
    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs.max(0.0);
        self
    }
    
    /// Keeps a [`SimExport`] in every result.
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }
    
    fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_duration_secs).unwrap_or(Duration::ZERO)
    }
    
    fn config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            num_players: self.num_players,
            max_duration_secs: self.max_duration_secs,
            ..Default::default()
        }
    }
    
    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        
        let (world, outcome) = match scenario {
            ScenarioId::Triangle => self.run_triangle(),
            ScenarioId::Duet => self.run_duet(),
            ScenarioId::Ring => self.run_ring(),
            ScenarioId::Scatter => self.run_scatter(),
            ScenarioId::Chorus => self.run_chorus(),
            ScenarioId::Backlog => self.run_backlog(),
            ScenarioId::Vanish => self.run_vanish(),
            ScenarioId::Refresh => self.run_refresh(),
        };
        
        let failure_reason = outcome.err();
        let passed = failure_reason.is_none();
        if let Some(reason) = &failure_reason {
            warn!("{} failed: {}", scenario.name(), reason);
        }
        
        let export = self.capture.then(|| {
            let mut export = SimExport::capture(scenario.name(), &world);
            export.finalize(passed, failure_reason.clone());
            export
        });
        
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            final_time_secs: world.time(),
            final_player_count: world.player_count(),
            failure_reason,
            metrics: ScenarioMetrics::from_world(&world),
            export,
        }
    }
    
    /// ENS-001: Triangle - the reference board.
    ///
    /// **Assertion**: B, 5 units away, hears every opening note exactly
    /// 500 ms after it leaves A; C, on top of A, hears it at once.
    fn run_triangle(&self) -> (SimWorld, Result<(), String>) {
        info!("ENS-001: Triangle - propagation delay");
        
        let mut world = SimWorld::new(SimConfig {
            window_size: 1000,
            ..self.config()
        });
        let a = world.place("a", 0.0, 0.0);
        let b = world.place("b", 3.0, 4.0);
        let c = world.place("c", 0.0, 0.0);
        world.kit.select_player(&a);
        
        if world.kit.play().as_ref() != Some(&a) {
            return (world, Err("a did not start".to_string()));
        }
        world.run_until(Duration::from_secs(10));
        
        let sent = arrivals(world.kit.journal(), &a, &a);
        let phrase: Vec<MusicEvent> = (0..world.kit.config().phrase_length)
            .map(|_| MusicEvent::new(a.clone(), 1.0, world.kit.config().phrase_note_secs))
            .collect();
        let offsets = serial_offsets(&phrase);
        let late: Vec<Duration> = offsets.iter().map(|o| *o + Duration::from_millis(500)).collect();
        
        let outcome = if sent != offsets {
            Err(format!("a sent at {:?}, expected {:?}", sent, offsets))
        } else if arrivals(world.kit.journal(), &b, &a) != late {
            Err(format!("b heard at {:?}, expected {:?}", arrivals(world.kit.journal(), &b, &a), late))
        } else if arrivals(world.kit.journal(), &c, &a) != offsets {
            Err(format!("c heard at {:?}, expected {:?}", arrivals(world.kit.journal(), &c, &a), offsets))
        } else {
            Ok(())
        };
        (world, outcome)
    }
    
    /// ENS-002: Duet - two echo players answering each other.
    ///
    /// **Assertion**: no player starts a response before its previous
    /// response has finished.
    fn run_duet(&self) -> (SimWorld, Result<(), String>) {
        info!("ENS-002: Duet - busy-gate spacing");
        
        let mut world = SimWorld::new(SimConfig {
            window_size: 1,
            ..self.config()
        });
        let a = world.place("a", 0.0, 0.0);
        world.place("b", 4.0, 0.0);
        world.kit.select_player(&a);
        world.kit.play();
        
        let deadline = self.duration();
        let mut phrase_ends: HashMap<PlayerId, Duration> = HashMap::new();
        while world.kit.next_due().is_some_and(|due| due <= deadline) {
            let Some(answer) = step_watching(&mut world.kit) else {
                continue;
            };
            if let Err(reason) = check_spacing(&mut phrase_ends, &answer) {
                return (world, Err(reason));
            }
        }
        world.run_until(deadline);
        
        let outcome = if world.kit.stats().responses == 0 {
            Err("nobody answered".to_string())
        } else {
            Ok(())
        };
        (world, outcome)
    }
    
    /// ENS-003: Ring - delivery order on a ring.
    ///
    /// **Assertion**: the first opening note reaches players in order of
    /// distance, each after exactly its propagation delay.
    fn run_ring(&self) -> (SimWorld, Result<(), String>) {
        info!("ENS-003: Ring - distance ordering ({} players)", self.num_players);
        
        let mut world = SimWorld::new(SimConfig {
            layout: Layout::Ring { radius: 5.0 },
            window_size: 1000,
            ..self.config()
        });
        let ids = match world.spawn_players() {
            Ok(ids) => ids,
            Err(e) => return (world, Err(e.to_string())),
        };
        let starter = ids[0].clone();
        world.kit.play();
        // The second note leaves at 2 s; the ring is 10 units across.
        world.run_until(Duration::from_millis(1999));
        
        let outcome = check_ring(&world, &starter, ids.len());
        (world, outcome)
    }
    
    /// ENS-004: Scatter - determinism.
    ///
    /// **Assertion**: two runs from the same seed produce identical
    /// delivery journals.
    fn run_scatter(&self) -> (SimWorld, Result<(), String>) {
        info!("ENS-004: Scatter - determinism");
        
        let config = SimConfig {
            layout: Layout::Scatter { spread: 8.0 },
            window_size: 2,
            strategies: vec!["echo".to_string(), "harmonize".to_string()],
            ..self.config()
        };
        
        let run = |config: SimConfig| {
            let mut world = SimWorld::new(config);
            let spawned = world.spawn_players().map(|_| ());
            world.kit.play();
            world.run_until(self.duration());
            (world, spawned)
        };
        let (first, spawned) = run(config.clone());
        let (second, _) = run(config);
        
        let outcome = spawned.map_err(|e| e.to_string()).and_then(|_| {
            if first.kit.journal().is_empty() {
                Err("nothing was delivered".to_string())
            } else if first.kit.journal() != second.kit.journal() {
                Err("runs diverged".to_string())
            } else {
                Ok(())
            }
        });
        debug!("Scatter journal: {} deliveries", first.kit.journal().len());
        (first, outcome)
    }
    
    /// ENS-005: Chorus - harmonizing ensemble.
    ///
    /// **Assertion**: responses happen, and every answered note is the
    /// heard note transposed by one of [`HARMONIZE_RATIOS`].
    fn run_chorus(&self) -> (SimWorld, Result<(), String>) {
        info!("ENS-005: Chorus - harmonize");
        
        let mut world = SimWorld::new(SimConfig {
            layout: Layout::Ring { radius: 4.0 },
            window_size: 1,
            strategies: vec!["harmonize".to_string()],
            ..self.config()
        });
        if let Err(e) = world.spawn_players() {
            return (world, Err(e.to_string()));
        }
        world.kit.play();
        
        let deadline = self.duration();
        let mut answers = 0;
        while world.kit.next_due().is_some_and(|due| due <= deadline) {
            let Some(answer) = step_watching(&mut world.kit) else {
                continue;
            };
            if let Err(reason) = check_ratios(&answer) {
                return (world, Err(reason));
            }
            answers += 1;
        }
        world.run_until(deadline);
        debug!("Chorus checked {} answers", answers);
        
        let outcome = if answers == 0 {
            Err("nobody answered".to_string())
        } else {
            Ok(())
        };
        (world, outcome)
    }
    
    /// ENS-006: Backlog - flooding a busy responder.
    ///
    /// Two callers play short notes at the same time, so the responder's
    /// window refills twice as fast as it can answer.
    ///
    /// **Assertion**: the responder is gated at least once and its window
    /// never outgrows `max(window, max_response_events)`.
    fn run_backlog(&self) -> (SimWorld, Result<(), String>) {
        info!("ENS-006: Backlog - bounded window");
        
        let window = 2;
        let max_events = 3;
        let mut world = SimWorld::new(SimConfig {
            window_size: 1000,
            max_response_events: max_events,
            ..self.config()
        });
        let a = world.place("a", 0.0, 0.0);
        let b = world.place("b", 1.0, 0.0);
        let c = world.place("c", 2.0, 0.0);
        world.kit.update_roster(&[PlayerRecord {
            evaluation_window_size_in_events: Some(window as f64),
            ..PlayerRecord::with_id("b")
        }]);
        
        for caller in [&a, &c] {
            let flood: Vec<MusicEvent> = (0..40)
                .map(|i| MusicEvent::new(caller.clone(), 1.0 + 0.01 * i as f64, 0.25))
                .collect();
            world.kit.broadcast_serial(caller, flood);
        }
        
        let limit = window.max(max_events);
        let deadline = self.duration().max(Duration::from_secs(12));
        let mut largest = 0;
        while world.kit.next_due().is_some_and(|due| due <= deadline) {
            world.kit.step();
            let backlog = world.kit.player(&b).map_or(0, |p| p.window_len());
            largest = largest.max(backlog);
        }
        world.run_until(deadline);
        debug!("Responder backlog peaked at {}", largest);
        
        let outcome = if world.kit.stats().gated == 0 {
            Err("responder was never busy".to_string())
        } else if largest > limit {
            Err(format!("window reached {} (limit {})", largest, limit))
        } else {
            Ok(())
        };
        (world, outcome)
    }
    
    /// ENS-007: Vanish - players leaving with notes in flight.
    ///
    /// **Assertion**: deliveries to removed players are dropped without
    /// errors and nobody removed hears anything afterwards.
    fn run_vanish(&self) -> (SimWorld, Result<(), String>) {
        info!("ENS-007: Vanish - removal mid-phrase");
        
        let mut world = SimWorld::new(SimConfig {
            layout: Layout::Line { spacing: 2.0 },
            window_size: 1,
            ..self.config()
        });
        let ids = match world.spawn_players() {
            Ok(ids) => ids,
            Err(e) => return (world, Err(e.to_string())),
        };
        world.kit.play();
        // Fan out the first note, then pull everyone but the starter
        // and its neighbour.
        world.run_until(Duration::ZERO);
        let removed: Vec<PlayerId> = ids.iter().skip(2).cloned().collect();
        for id in &removed {
            world.kit.remove_player(id);
        }
        world.run_until(self.duration());
        
        let stats = world.kit.stats();
        let outcome = if stats.dropped_deliveries < removed.len() as u64 {
            Err(format!(
                "{} drops for {} removed players",
                stats.dropped_deliveries,
                removed.len()
            ))
        } else if !world.reporter.messages().is_empty() {
            Err(format!("errors reported: {:?}", world.reporter.messages()))
        } else if world.kit.journal().iter().any(|d| removed.contains(&d.recipient)) {
            Err("a removed player heard a note".to_string())
        } else {
            Ok(())
        };
        (world, outcome)
    }
    
    /// ENS-008: Refresh - roster reload from session JSON.
    ///
    /// **Assertion**: reloading a moved board keeps every player's
    /// identity and in-flight window.
    fn run_refresh(&self) -> (SimWorld, Result<(), String>) {
        info!("ENS-008: Refresh - in-place merge");
        
        let mut world = SimWorld::new(SimConfig {
            layout: Layout::Line { spacing: 3.0 },
            window_size: 3,
            ..self.config()
        });
        if let Err(e) = world.spawn_players() {
            return (world, Err(e.to_string()));
        }
        world.kit.play();
        world.run_until(Duration::from_millis(2500));
        
        let before: Vec<(PlayerId, u64, usize)> = world
            .kit
            .roster()
            .iter()
            .map(|p| (p.id.clone(), p.incarnation(), p.window_len()))
            .collect();
        
        let text = match world.kit.session_state().to_json() {
            Ok(text) => text,
            Err(e) => return (world, Err(e.to_string())),
        };
        let mut state = match SessionState::from_json(&text) {
            Ok(state) => state,
            Err(e) => return (world, Err(e.to_string())),
        };
        for record in &mut state.players {
            if let Some(position) = record.position.as_mut() {
                position.x += 1.0;
            }
        }
        let report = world.kit.apply_state(&state);
        
        let mut outcome = if report.is_clean() {
            Ok(())
        } else {
            Err(format!("{} records rejected", report.rejected.len()))
        };
        for (id, incarnation, window) in &before {
            let Some(player) = world.kit.player(id) else {
                outcome = Err(format!("{} lost in refresh", id));
                break;
            };
            if player.incarnation() != *incarnation || player.window_len() != *window {
                outcome = Err(format!("{} was rebuilt by the refresh", id));
                break;
            }
        }
        if outcome.is_ok() && before.iter().all(|(_, _, window)| *window == 0) {
            outcome = Err("no window was in flight".to_string());
        }
        
        world.run_until(self.duration());
        let moved = world
            .kit
            .player(&before[0].0)
            .map(|p| p.position)
            .unwrap_or_default();
        if outcome.is_ok() && moved != Position::new(1.0, 0.0) {
            outcome = Err(format!("refresh did not move the starter ({:?})", moved));
        }
        (world, outcome)
    }
}

/// Checks that the starter's first note reached every player in order
/// of distance, each after its exact propagation delay.
fn check_ring(world: &SimWorld, starter: &PlayerId, players: usize) -> Result<(), String> {
    let origin = world
        .kit
        .player(starter)
        .map(|p| p.position)
        .ok_or_else(|| "starter vanished".to_string())?;
    let ms_per_unit = world.config.ms_per_unit;
    
    let mut heard = 0;
    let mut last = Duration::ZERO;
    for delivery in world.kit.journal().iter().filter(|d| &d.sender == starter) {
        let Some(position) = world.kit.player(&delivery.recipient).map(|p| p.position) else {
            continue;
        };
        let expected_ms = ms_per_unit * origin.distance(&position);
        let actual_ms = delivery.at.as_secs_f64() * 1000.0;
        if (actual_ms - expected_ms).abs() > 1e-3 {
            return Err(format!(
                "{} heard at {:.3} ms, expected {:.3} ms",
                delivery.recipient, actual_ms, expected_ms
            ));
        }
        if delivery.at < last {
            return Err(format!("{} heard out of order", delivery.recipient));
        }
        last = delivery.at;
        heard += 1;
    }
    
    if heard != players {
        return Err(format!("{} of {} players heard the first note", heard, players));
    }
    Ok(())
}

/// A delivery that triggered a response, with what went into it.
#[derive(Debug, Clone)]
struct Answer {
    delivery: Delivery,
    
    /// Events the responder answered, oldest first
    heard: Vec<MusicEvent>,
    
    /// The response phrase as queued: start time and event
    phrase: Vec<(Duration, MusicEvent)>,
}

/// Steps the kit once. When the step is a delivery that made its recipient
/// respond, returns the answered events and the phrase it queued.
fn step_watching(kit: &mut Kit) -> Option<Answer> {
    let before = kit.pending_tasks();
    let max_events = kit.config().max_response_events;
    let window = match before.first().map(|t| &t.task) {
        Some(Task::Deliver { recipient, event }) => kit.player(recipient).map(|p| {
            let mut window: Vec<MusicEvent> = p.evaluation_window().cloned().collect();
            if event.sender_id != p.id {
                window.push(event.clone());
                if window.len() > p.backlog_limit(max_events) {
                    window.remove(0);
                }
            }
            window
        }),
        _ => None,
    };
    
    let Some(Dispatch::Delivered(delivery)) = kit.step() else {
        return None;
    };
    if !delivery.responded {
        return None;
    }
    
    let mut heard = window.unwrap_or_default();
    heard.truncate(max_events);
    let phrase = kit
        .pending_tasks()
        .into_iter()
        .filter(|t| !before.contains(t))
        .filter_map(|t| match t.task {
            Task::Broadcast { sender, event, .. } if sender == delivery.recipient => Some((t.at, event)),
            _ => None,
        })
        .collect();
    Some(Answer { delivery, heard, phrase })
}

/// Fails if a player answers before its previous phrase has finished.
fn check_spacing(phrase_ends: &mut HashMap<PlayerId, Duration>, answer: &Answer) -> Result<(), String> {
    let responder = &answer.delivery.recipient;
    if let Some(end) = phrase_ends.get(responder) {
        if answer.delivery.at < *end {
            return Err(format!(
                "{} answered at {:?} while still playing until {:?}",
                responder, answer.delivery.at, end
            ));
        }
    }
    let end = answer
        .phrase
        .iter()
        .map(|(at, event)| *at + event.duration())
        .max()
        .unwrap_or(answer.delivery.at);
    phrase_ends.insert(responder.clone(), end);
    Ok(())
}

/// Fails unless each answered note is its heard note times a harmonize ratio.
fn check_ratios(answer: &Answer) -> Result<(), String> {
    if answer.phrase.len() != answer.heard.len() {
        return Err(format!(
            "{} heard {} notes but answered with {}",
            answer.delivery.recipient,
            answer.heard.len(),
            answer.phrase.len()
        ));
    }
    for (heard, (_, played)) in answer.heard.iter().zip(&answer.phrase) {
        let ratio = played.pitch / heard.pitch;
        if !HARMONIZE_RATIOS.iter().any(|r| (ratio - r).abs() <= 1e-9 * r.abs()) {
            return Err(format!(
                "{} answered {} with {} (ratio {})",
                answer.delivery.recipient, heard.pitch, played.pitch, ratio
            ));
        }
    }
    Ok(())
}

/// Arrival times at `recipient` of everything `sender` sent.
fn arrivals(journal: &[Delivery], recipient: &PlayerId, sender: &PlayerId) -> Vec<Duration> {
    journal
        .iter()
        .filter(|d| &d.recipient == recipient && &d.sender == sender)
        .map(|d| d.at)
        .collect()
}
