//! Players: position, voice, evaluation window and busy-gate.

use crate::error::RosterError;
use crate::event::{MusicEvent, Voice};
use crate::geometry::Position;
use crate::record::{PlayerRecord, RecordPosition, UiState};
use crate::strategy::StrategySelector;
use antiphon_env::PlayerId;
use std::collections::VecDeque;
use std::time::Duration;

/// What happened when a player heard an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Heard {
    /// The player's own event coming back; never accumulated
    OwnEvent,
    
    /// Added to the window, threshold not reached
    Accumulated,
    
    /// Threshold reached while free: the drained batch to respond to
    Ready(Vec<MusicEvent>),
    
    /// Threshold reached while busy: window kept for the next attempt
    Gated {
        backlog: usize,
        dropped_oldest: bool,
    },
}

/// An ensemble member.
#[derive(Debug, Clone)]
pub struct Player {
    /// Stable identity, never reassigned
    pub id: PlayerId,
    
    pub label: String,
    
    pub position: Position,
    
    /// Whether this player is the one the UI is listening through
    pub selected: bool,
    
    /// Which loaded sample voices this player
    pub sample_index: usize,
    
    pub pan: f64,
    
    pub amp: f64,
    
    /// Number of heard events that triggers a response (at least 1)
    pub evaluation_window_size: usize,
    
    pub strategies: StrategySelector,
    
    /// Carried for round-tripping; not used by the scheduler
    pub tick_secs: f64,
    
    /// Session time before which no new response starts
    pub can_next_respond_at: Duration,
    
    /// Heard events awaiting a response
    evaluation_window: VecDeque<MusicEvent>,
    
    /// Assigned by the roster when the player is built; merges keep it
    incarnation: u64,
}

impl Player {
    pub(crate) fn new(id: PlayerId, incarnation: u64) -> Self {
        Self {
            id,
            label: String::new(),
            position: Position::default(),
            selected: false,
            sample_index: 0,
            pan: 0.0,
            amp: 0.0,
            evaluation_window_size: 1,
            strategies: StrategySelector::default(),
            tick_secs: 0.0,
            can_next_respond_at: Duration::ZERO,
            evaluation_window: VecDeque::new(),
            incarnation,
        }
    }
    
    /// Builds a new player from an external record. Missing fields take
    /// their zero defaults; the evaluation window always starts empty.
    pub(crate) fn from_record(record: &PlayerRecord, incarnation: u64) -> Result<Self, RosterError> {
        if record.id.is_empty() {
            return Err(RosterError::MissingId);
        }
        let mut player = Self::new(PlayerId::new(record.id.clone()), incarnation);
        player.apply_record(record)?;
        Ok(player)
    }
    
    /// Merges a record into this player in place.
    ///
    /// Only fields present in the record change. Identity, incarnation and
    /// the evaluation window are untouched. The busy-gate only ever moves
    /// later, so a refresh cannot cut a running response short.
    pub(crate) fn apply_record(&mut self, record: &PlayerRecord) -> Result<(), RosterError> {
        // Resolve strategies first so a bad record changes nothing.
        let strategies = match &record.response_strategy_names {
            Some(names) => Some(StrategySelector::from_names(names).map_err(|source| {
                RosterError::InvalidStrategy {
                    id: self.id.clone(),
                    source,
                }
            })?),
            None => None,
        };
        
        if let Some(strategies) = strategies {
            self.strategies = strategies;
        }
        if let Some(label) = &record.label {
            self.label = label.clone();
        }
        if let Some(position) = record.position {
            self.position = Position::new(position.x, position.y);
        }
        if let Some(ui) = record.ui_state {
            self.selected = ui.selected;
        }
        if let Some(sample_index) = record.sample_index {
            self.sample_index = sample_index.max(0.0) as usize;
        }
        if let Some(pan) = record.pan {
            self.pan = pan;
        }
        if let Some(amp) = record.amp {
            self.amp = amp;
        }
        if let Some(size) = record.evaluation_window_size_in_events {
            self.evaluation_window_size = (size.max(0.0) as usize).max(1);
        }
        if let Some(tick_secs) = record.tick_secs {
            self.tick_secs = tick_secs;
        }
        if let Some(gate) = record.can_next_respond_at_time {
            let gate = Duration::try_from_secs_f64(gate).unwrap_or(Duration::ZERO);
            self.can_next_respond_at = self.can_next_respond_at.max(gate);
        }
        Ok(())
    }
    
    /// Writes the player back out in record form (without the window).
    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord {
            id: self.id.to_string(),
            label: Some(self.label.clone()),
            position: Some(RecordPosition {
                x: self.position.x,
                y: self.position.y,
            }),
            ui_state: Some(UiState {
                selected: self.selected,
            }),
            sample_index: Some(self.sample_index as f64),
            pan: Some(self.pan),
            amp: Some(self.amp),
            evaluation_window_size_in_events: Some(self.evaluation_window_size as f64),
            response_strategy_names: Some(self.strategies.names()),
            tick_secs: Some(self.tick_secs),
            can_next_respond_at_time: Some(self.can_next_respond_at.as_secs_f64()),
        }
    }
    
    /// Roster-assigned construction number.
    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }
    
    /// The voice this player stamps onto the events it emits.
    pub fn voice(&self) -> Voice {
        Voice {
            id: self.id.clone(),
            pan: self.pan,
            amp: self.amp,
            sample_index: self.sample_index,
        }
    }
    
    /// True while a previous response is still being performed.
    pub fn is_busy(&self, now: Duration) -> bool {
        now < self.can_next_respond_at
    }
    
    /// Events heard and not yet responded to, oldest first.
    pub fn evaluation_window(&self) -> impl Iterator<Item = &MusicEvent> {
        self.evaluation_window.iter()
    }
    
    pub fn window_len(&self) -> usize {
        self.evaluation_window.len()
    }
    
    /// Most events the window holds while the player is busy.
    pub fn backlog_limit(&self, max_response_events: usize) -> usize {
        self.evaluation_window_size.max(max_response_events).max(1)
    }
    
    /// Takes one event into the evaluation window.
    ///
    /// Own events are never accumulated. When the window reaches the
    /// threshold and the player is free, up to `max_response_events` of
    /// the oldest events are handed back and the window is emptied. While
    /// busy the window is kept, capped at [`Player::backlog_limit`] by
    /// dropping the oldest event.
    pub fn listen(&mut self, event: &MusicEvent, now: Duration, max_response_events: usize) -> Heard {
        if event.sender_id == self.id {
            return Heard::OwnEvent;
        }
        
        self.evaluation_window.push_back(event.clone());
        let mut dropped_oldest = false;
        if self.evaluation_window.len() > self.backlog_limit(max_response_events) {
            self.evaluation_window.pop_front();
            dropped_oldest = true;
        }
        
        if self.evaluation_window.len() < self.evaluation_window_size {
            return Heard::Accumulated;
        }
        
        if self.is_busy(now) {
            return Heard::Gated {
                backlog: self.evaluation_window.len(),
                dropped_oldest,
            };
        }
        
        let batch = self
            .evaluation_window
            .drain(..)
            .take(max_response_events)
            .collect();
        Heard::Ready(batch)
    }
    
    /// Marks the player busy for `length` from `now`, unless it already is.
    ///
    /// Returns the new gate time when the gate was set.
    pub fn occupy(&mut self, now: Duration, length: Duration) -> Option<Duration> {
        if self.is_busy(now) {
            return None;
        }
        let gate = now + length;
        self.can_next_respond_at = gate;
        Some(gate)
    }
    
    /// Clears the gate if it still holds the value set by [`Player::occupy`].
    pub fn release_gate(&mut self, gate: Duration) -> bool {
        if self.can_next_respond_at == gate {
            self.can_next_respond_at = Duration::ZERO;
            true
        } else {
            false
        }
    }
}
