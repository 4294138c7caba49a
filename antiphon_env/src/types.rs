//! Common types for the Antiphon environment abstraction.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Builder;

/// Unique identifier for a player.
///
/// Ids are opaque strings so that externally persisted rosters keep
/// whatever ids they were created with. Freshly generated ids look like
/// `player-3fa2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wraps an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    
    /// Generates a short random id from the given RNG.
    ///
    /// Uses the RNG rather than OS entropy so seeded sessions produce the
    /// same ids on every run.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let uuid = Builder::from_random_bytes(rng.gen()).into_uuid();
        let simple = uuid.simple().to_string();
        Self(format!("player-{}", &simple[..4]))
    }
    
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
    
    /// True for the empty id, which no roster accepts.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A request to the audio collaborator to sound one event.
///
/// The core never renders audio itself; it only describes what should be
/// played and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRequest {
    /// Playback rate of the sample (the event's pitch ratio)
    pub pitch: f64,
    
    /// Stereo pan, -1 (left) to 1 (right)
    pub pan: f64,
    
    /// Peak amplitude, 0 to 1
    pub amp: f64,
    
    /// Index into the loaded sample bank
    pub sample_index: usize,
    
    /// How long the note sounds
    pub duration: Duration,
    
    /// Clock time at which the note starts
    pub at: Duration,
}
