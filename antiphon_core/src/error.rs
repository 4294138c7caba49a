//! Error types for the ensemble core.

use antiphon_env::PlayerId;
use thiserror::Error;

/// A response strategy name that does not resolve to a known strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("Unknown response strategy: {0}")]
    Unknown(String),
}

/// Roster-consistency errors. These are reported and skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RosterError {
    /// Update for a player that is no longer on the roster
    #[error("Could not find player that matches id {0}")]
    UnknownPlayer(PlayerId),
    
    #[error("Player record has no id")]
    MissingId,
    
    /// The record names a strategy that does not exist
    #[error("Player {id} is misconfigured: {source}")]
    InvalidStrategy {
        id: PlayerId,
        #[source]
        source: StrategyError,
    },
}

/// Malformed session state text.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Malformed session state: {0}")]
    Parse(#[from] serde_json::Error),
}
