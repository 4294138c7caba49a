//! Response strategies.
//!
//! A strategy turns the batch of events a player has heard into the phrase
//! it plays back. Strategy names from external state are resolved to the
//! closed [`ResponseStrategy`] enum when a player is built, so a misspelled
//! name is rejected up front instead of surfacing mid-performance.

use crate::error::StrategyError;
use crate::event::{MusicEvent, Voice};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Frequency ratios harmonize picks from: octave down, just-ish fourth
/// down, just-ish fourth up, octave up.
pub const HARMONIZE_RATIOS: [f64; 4] = [0.5, 1.0 / 1.33, 1.33, 2.0];

/// How a player answers what it heard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStrategy {
    /// Play every heard event back in the responder's own voice
    Echo,
    
    /// Echo, with each event transposed by a random ratio from [`HARMONIZE_RATIOS`]
    Harmonize,
}

impl ResponseStrategy {
    /// Returns every known strategy.
    pub fn all() -> Vec<ResponseStrategy> {
        vec![ResponseStrategy::Echo, ResponseStrategy::Harmonize]
    }
    
    /// Returns the strategy name as used in player records.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseStrategy::Echo => "echo",
            ResponseStrategy::Harmonize => "harmonize",
        }
    }
    
    /// Builds the response phrase for `events` in `voice`.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        voice: &Voice,
        events: &[MusicEvent],
        rng: &mut R,
    ) -> Vec<MusicEvent> {
        match self {
            ResponseStrategy::Echo => events.iter().map(|e| e.restamped(voice)).collect(),
            ResponseStrategy::Harmonize => events
                .iter()
                .map(|e| {
                    let ratio = HARMONIZE_RATIOS[rng.gen_range(0..HARMONIZE_RATIOS.len())];
                    e.restamped(voice).transposed(ratio)
                })
                .collect(),
        }
    }
}

impl std::fmt::Display for ResponseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ResponseStrategy {
    type Err = StrategyError;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "echo" => Ok(ResponseStrategy::Echo),
            "harmonize" | "harmonise" => Ok(ResponseStrategy::Harmonize),
            _ => Err(StrategyError::Unknown(s.to_string())),
        }
    }
}

/// Which strategy a player uses for its next response.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategySelector {
    /// Always the same strategy
    Fixed(ResponseStrategy),
    
    /// One picked uniformly at random per response
    OneOf(Vec<ResponseStrategy>),
}

impl StrategySelector {
    /// Resolves strategy names. No names means echo.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, StrategyError> {
        let strategies = names
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<Vec<ResponseStrategy>, _>>()?;
        
        Ok(match strategies.as_slice() {
            [] => StrategySelector::Fixed(ResponseStrategy::Echo),
            [only] => StrategySelector::Fixed(*only),
            _ => StrategySelector::OneOf(strategies),
        })
    }
    
    /// Picks the strategy for one response.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> ResponseStrategy {
        match self {
            StrategySelector::Fixed(strategy) => *strategy,
            StrategySelector::OneOf(options) => options
                .choose(rng)
                .copied()
                .unwrap_or(ResponseStrategy::Echo),
        }
    }
    
    /// Strategy names, for writing the player back out.
    pub fn names(&self) -> Vec<String> {
        match self {
            StrategySelector::Fixed(strategy) => vec![strategy.name().to_string()],
            StrategySelector::OneOf(options) => {
                options.iter().map(|s| s.name().to_string()).collect()
            }
        }
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        StrategySelector::Fixed(ResponseStrategy::Echo)
    }
}
