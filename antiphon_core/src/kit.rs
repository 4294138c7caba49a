//! The ensemble session: roster, clock, task queue and collaborators.
//!
//! A [`Kit`] owns everything a session needs and is driven from outside.
//! User-facing triggers (add, move, select, play, roster refresh) mutate
//! the roster or queue work; [`Kit::step`] and [`Kit::run_until`] dispatch
//! queued tasks in time order and advance the session clock.
//!
//! ```text
//!   triggers ──► Roster ◄──┐
//!       │                  │ hear / respond
//!       ▼                  │
//!   TaskQueue ──step──► dispatch ──► AudioSink / ErrorReporter
//! ```

use crate::error::RosterError;
use crate::geometry::{Position, PropagationModel, DEFAULT_MS_PER_UNIT};
use crate::player::Player;
use crate::record::{PlayerRecord, RecordPosition, UiState};
use crate::roster::{MergeReport, NoopNotifier, Roster, RosterNotifier};
use crate::scheduler::{ScheduledTask, Task, TaskQueue};
use crate::state::SessionState;
use antiphon_env::{AudioSink, ErrorReporter, LogReporter, NullAudio, PlayerId, SampleLoader, StaticLoader};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KitConfig {
    /// Seed for strategy choice, phrase shuffling and id generation
    pub seed: u64,
    
    /// Propagation delay in milliseconds per unit of distance
    pub ms_per_unit: f64,
    
    /// Most events a single response is built from
    pub max_response_events: usize,
    
    /// Notes in an opening phrase
    pub phrase_length: usize,
    
    /// How many of the lowest diamond pitches the opening phrase draws from
    pub phrase_pitch_pool: usize,
    
    /// Duration of each opening note, in seconds
    pub phrase_note_secs: f64,
    
    /// Odd limit of the tonality diamond used for opening phrases
    pub diamond_limit: u32,
    
    /// Directory samples are loaded from
    pub sample_base: String,
    
    /// Sample files, indexed by a player's `sample_index`
    pub sample_files: Vec<String>,
    
    /// Keep a journal of every delivery
    pub record_journal: bool,
    
    /// Upper bound on tasks dispatched by one `run_until` call
    pub max_dispatch_per_run: usize,
}

impl Default for KitConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ms_per_unit: DEFAULT_MS_PER_UNIT,
            max_response_events: 8,
            phrase_length: 4,
            phrase_pitch_pool: 8,
            phrase_note_secs: 2.0,
            diamond_limit: 5,
            sample_base: "samples".to_string(),
            sample_files: vec![
                "trumpet-D2.wav".to_string(),
                "glass-less-full.wav".to_string(),
                "timpani-d.wav".to_string(),
                "Vibraphone.sustain.ff.D4.wav".to_string(),
            ],
            record_journal: false,
            max_dispatch_per_run: 1_000_000,
        }
    }
}

impl KitConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    
    pub fn with_ms_per_unit(mut self, ms_per_unit: f64) -> Self {
        self.ms_per_unit = ms_per_unit;
        self
    }
    
    pub fn with_max_response_events(mut self, max: usize) -> Self {
        self.max_response_events = max.max(1);
        self
    }
    
    pub fn with_phrase_length(mut self, length: usize) -> Self {
        self.phrase_length = length;
        self
    }
    
    pub fn with_journal(mut self, enabled: bool) -> Self {
        self.record_journal = enabled;
        self
    }
}

// ============================================================================
// DISPATCH RESULTS
// ============================================================================

/// One event arriving at one player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    /// Session time of arrival
    pub at: Duration,
    pub sender: PlayerId,
    pub recipient: PlayerId,
    pub pitch: f64,
    pub meta_message: String,
    
    /// Whether the event went into the recipient's window
    pub accumulated: bool,
    
    /// Whether the arrival triggered a response
    pub responded: bool,
}

/// What a single [`Kit::step`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A broadcast fanned out into `deliveries` queued deliveries
    Broadcast { sender: PlayerId, deliveries: usize },
    
    Delivered(Delivery),
    
    /// The recipient had left the roster
    Dropped { recipient: PlayerId },
    
    GateReleased { player: PlayerId, released: bool },
}

/// Running counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KitStats {
    pub broadcasts: u64,
    pub deliveries: u64,
    pub dropped_deliveries: u64,
    pub responses: u64,
    
    /// Threshold reached while the listener was busy
    pub gated: u64,
    
    /// Events discarded from a busy listener's backlog
    pub backlog_dropped: u64,
    
    pub gate_releases: u64,
    pub audio_triggers: u64,
    pub audio_failures: u64,
    
    /// Largest evaluation window observed
    pub max_backlog: usize,
}

// ============================================================================
// KIT
// ============================================================================

/// A running ensemble session.
pub struct Kit {
    pub(crate) config: KitConfig,
    pub(crate) roster: Roster,
    pub(crate) queue: TaskQueue,
    
    /// Session clock
    pub(crate) now: Duration,
    
    pub(crate) seed: u64,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) model: PropagationModel,
    
    pub(crate) audio: Box<dyn AudioSink>,
    pub(crate) reporter: Box<dyn ErrorReporter>,
    pub(crate) loader: Box<dyn SampleLoader>,
    pub(crate) notifier: Box<dyn RosterNotifier>,
    
    /// Loaded sample handles; empty until the first `play`
    pub(crate) samples: Vec<String>,
    
    /// Cleared when samples fail to load; nothing is sent to the sink then
    pub(crate) audio_enabled: bool,
    
    pub(crate) journal: Vec<Delivery>,
    pub(crate) stats: KitStats,
}

impl Kit {
    /// Creates an empty session with silent collaborators.
    ///
    /// `max_response_events` and `max_dispatch_per_run` are raised to at
    /// least 1.
    pub fn new(mut config: KitConfig) -> Self {
        config.max_response_events = config.max_response_events.max(1);
        config.max_dispatch_per_run = config.max_dispatch_per_run.max(1);
        let seed = config.seed;
        Self {
            model: PropagationModel::new(config.ms_per_unit),
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            config,
            roster: Roster::new(),
            queue: TaskQueue::new(),
            now: Duration::ZERO,
            audio: Box::new(NullAudio),
            reporter: Box::new(LogReporter),
            loader: Box::new(StaticLoader),
            notifier: Box::new(NoopNotifier),
            samples: Vec::new(),
            audio_enabled: true,
            journal: Vec::new(),
            stats: KitStats::default(),
        }
    }
    
    pub fn with_audio(mut self, audio: impl AudioSink + 'static) -> Self {
        self.audio = Box::new(audio);
        self
    }
    
    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }
    
    pub fn with_loader(mut self, loader: impl SampleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }
    
    pub fn with_notifier(mut self, notifier: impl RosterNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }
    
    // ========== Accessors ==========
    
    pub fn config(&self) -> &KitConfig {
        &self.config
    }
    
    pub fn roster(&self) -> &Roster {
        &self.roster
    }
    
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.roster.get(id)
    }
    
    /// Current session time.
    pub fn now(&self) -> Duration {
        self.now
    }
    
    pub fn seed(&self) -> u64 {
        self.seed
    }
    
    pub fn stats(&self) -> &KitStats {
        &self.stats
    }
    
    pub fn journal(&self) -> &[Delivery] {
        &self.journal
    }
    
    pub fn samples(&self) -> &[String] {
        &self.samples
    }
    
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }
    
    /// Every queued task in firing order.
    pub fn pending_tasks(&self) -> Vec<ScheduledTask> {
        self.queue.pending()
    }
    
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.next_due()
    }
    
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }
    
    // ========== Dispatch ==========
    
    /// Dispatches the earliest queued task, advancing the clock to it.
    pub fn step(&mut self) -> Option<Dispatch> {
        let scheduled = self.queue.pop()?;
        self.now = self.now.max(scheduled.at);
        
        let dispatch = match scheduled.task {
            Task::Broadcast { sender, origin, event } => {
                let deliveries = self.broadcast_from(&sender, origin, event);
                Dispatch::Broadcast { sender, deliveries }
            }
            Task::Deliver { recipient, event } => match self.hear(&recipient, &event) {
                Some(delivery) => Dispatch::Delivered(delivery),
                None => Dispatch::Dropped { recipient },
            },
            Task::ReleaseGate { player, gate } => {
                let released = self
                    .roster
                    .get_mut(&player)
                    .map(|p| p.release_gate(gate))
                    .unwrap_or(false);
                if released {
                    self.stats.gate_releases += 1;
                    debug!("{} is free to respond again", player);
                }
                Dispatch::GateReleased { player, released }
            }
        };
        Some(dispatch)
    }
    
    /// Dispatches every task due at or before `deadline`, then moves the
    /// clock to `deadline`. Returns the number of tasks dispatched.
    pub fn run_until(&mut self, deadline: Duration) -> usize {
        let mut dispatched = 0;
        while self.queue.next_due().is_some_and(|due| due <= deadline) {
            if dispatched >= self.config.max_dispatch_per_run {
                warn!(
                    "Dispatch limit of {} reached at {:?}; {} tasks left",
                    self.config.max_dispatch_per_run,
                    self.now,
                    self.queue.len()
                );
                return dispatched;
            }
            if self.step().is_some() {
                dispatched += 1;
            }
        }
        self.now = self.now.max(deadline);
        dispatched
    }
    
    /// Runs the session forward by `span`.
    pub fn run_for(&mut self, span: Duration) -> usize {
        self.run_until(self.now + span)
    }
    
    // ========== Triggers ==========
    
    /// Adds a player with a fresh id and the stock voice.
    pub fn add_player(&mut self) -> Result<PlayerId, RosterError> {
        let id = loop {
            let candidate = PlayerId::generate(&mut self.rng);
            if !self.roster.contains(&candidate) && !self.roster.is_retired(&candidate) {
                break candidate;
            }
        };
        let pan = [-1.0, 1.0].choose(&mut self.rng).copied().unwrap_or(1.0);
        
        let record = PlayerRecord {
            label: Some(label_for_index(self.roster.len())),
            position: Some(RecordPosition { x: 25.0, y: 25.0 }),
            ui_state: Some(UiState { selected: false }),
            sample_index: Some(0.0),
            pan: Some(pan),
            amp: Some(0.5),
            evaluation_window_size_in_events: Some(4.0),
            response_strategy_names: Some(vec!["echo".to_string()]),
            tick_secs: Some(0.5),
            can_next_respond_at_time: Some(0.0),
            ..PlayerRecord::with_id(id.to_string())
        };
        let id = self.roster.admit(&record)?;
        self.notify();
        Ok(id)
    }
    
    /// Merges external player records into the roster.
    ///
    /// Rejected records are passed to the error reporter; the rest of the
    /// batch still applies.
    pub fn update_roster(&mut self, records: &[PlayerRecord]) -> MergeReport {
        let report = self.roster.merge(records);
        for error in &report.rejected {
            self.reporter.report(error);
        }
        report
    }
    
    /// Applies whole-session state: reseeds if the seed changed, then
    /// merges the players.
    pub fn apply_state(&mut self, state: &SessionState) -> MergeReport {
        if let Some(seed) = state.seed_value() {
            if seed != self.seed {
                info!("Reseeding session: {} -> {}", self.seed, seed);
                self.seed = seed;
                self.rng = ChaCha8Rng::seed_from_u64(seed);
            }
        }
        self.update_roster(&state.players)
    }
    
    /// Current session state in persisted form.
    pub fn session_state(&self) -> SessionState {
        SessionState {
            seed: Some(self.seed.to_string()),
            players: self.roster.records(),
        }
    }
    
    pub fn move_player(&mut self, id: &PlayerId, position: Position) -> bool {
        let Some(player) = self.roster.get_mut(id) else {
            return false;
        };
        player.position = position;
        self.notify();
        true
    }
    
    /// Makes `id` the only selected player.
    pub fn select_player(&mut self, id: &PlayerId) -> bool {
        if !self.roster.select_only(id) {
            return false;
        }
        self.notify();
        true
    }
    
    /// Takes a player off the roster. Deliveries still queued for it
    /// are dropped when they fire.
    pub fn remove_player(&mut self, id: &PlayerId) -> Option<Player> {
        let removed = self.roster.remove(id)?;
        self.notify();
        Some(removed)
    }
    
    /// Starts the ensemble from the selected player.
    ///
    /// Samples are loaded on first use. Returns the starter, or `None` when
    /// no player is selected.
    pub fn play(&mut self) -> Option<PlayerId> {
        self.ensure_samples();
        let Some(starter) = self.roster.selected().map(|p| p.id.clone()) else {
            debug!("Play ignored: no player selected");
            return None;
        };
        self.start(&starter);
        Some(starter)
    }
    
    /// Loads the configured samples unless already loaded.
    ///
    /// On failure the error is reported and audio stays muted until a
    /// later load succeeds.
    pub fn ensure_samples(&mut self) -> bool {
        if !self.samples.is_empty() {
            return true;
        }
        match self.loader.load(&self.config.sample_base, &self.config.sample_files) {
            Ok(handles) => {
                info!("Loaded {} samples from {}", handles.len(), self.config.sample_base);
                self.samples = handles;
                self.audio_enabled = true;
                true
            }
            Err(e) => {
                self.reporter.report(&e);
                self.audio_enabled = false;
                false
            }
        }
    }
    
    fn notify(&mut self) {
        let records = self.roster.records();
        self.notifier.roster_changed(&records);
    }
}

/// Display label for the player at `index`: a..z, then aa..zz, then aaa..zzz.
pub fn label_for_index(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    std::iter::repeat(letter).take(index / 26 + 1).collect()
}
