//! Musical events and phrases.

use antiphon_env::PlayerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One discrete musical event as exchanged between players.
///
/// Events are values: once built they are only ever cloned and
/// re-stamped, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicEvent {
    /// Player that emitted the event
    pub sender_id: PlayerId,
    
    /// Frequency ratio relative to the sample's native pitch
    pub pitch: f64,
    
    /// How long the event sounds, in seconds
    pub duration_secs: f64,
    
    /// Structural marker, e.g. "Start bar"
    pub meta_message: String,
    
    pub pan: f64,
    
    pub amp: f64,
    
    /// Timbre override; the listener's own sample is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_index: Option<usize>,
}

/// The acoustic identity a player stamps onto events it emits.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub id: PlayerId,
    pub pan: f64,
    pub amp: f64,
    pub sample_index: usize,
}

impl MusicEvent {
    /// Creates a centred, half-amplitude event with no meta message.
    pub fn new(sender_id: PlayerId, pitch: f64, duration_secs: f64) -> Self {
        Self {
            sender_id,
            pitch,
            duration_secs,
            meta_message: String::new(),
            pan: 0.0,
            amp: 0.5,
            sample_index: None,
        }
    }
    
    pub fn with_meta(mut self, meta_message: impl Into<String>) -> Self {
        self.meta_message = meta_message.into();
        self
    }
    
    pub fn with_pan(mut self, pan: f64) -> Self {
        self.pan = pan;
        self
    }
    
    pub fn with_amp(mut self, amp: f64) -> Self {
        self.amp = amp;
        self
    }
    
    pub fn with_sample_index(mut self, sample_index: usize) -> Self {
        self.sample_index = Some(sample_index);
        self
    }
    
    /// Event length as a `Duration`. Negative or non-finite lengths count as zero.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or(Duration::ZERO)
    }
    
    /// Copies the event as if `voice` had played it. Pitch is kept.
    pub fn restamped(&self, voice: &Voice) -> Self {
        Self {
            sender_id: voice.id.clone(),
            pan: voice.pan,
            amp: voice.amp,
            sample_index: Some(voice.sample_index),
            ..self.clone()
        }
    }
    
    /// Returns the event transposed by a frequency ratio.
    pub fn transposed(mut self, ratio: f64) -> Self {
        self.pitch *= ratio;
        self
    }
}

/// Total playing time of a phrase.
pub fn phrase_duration(events: &[MusicEvent]) -> Duration {
    events.iter().map(MusicEvent::duration).sum()
}

/// Start offset of each event when the phrase is played back to back.
///
/// Offset `i` is the sum of the durations of events `0..i`.
pub fn serial_offsets(events: &[MusicEvent]) -> Vec<Duration> {
    let mut offsets = Vec::with_capacity(events.len());
    let mut next = Duration::ZERO;
    for event in events {
        offsets.push(next);
        next += event.duration();
    }
    offsets
}
