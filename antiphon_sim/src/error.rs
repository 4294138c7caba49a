//! Error types for the simulation harness.

use antiphon_core::{RosterError, StateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    
    #[error(transparent)]
    State(#[from] StateError),
    
    #[error(transparent)]
    Roster(#[from] RosterError),
    
    #[error("No player is selected in the session")]
    NoStarter,
}
