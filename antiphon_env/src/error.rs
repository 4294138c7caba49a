//! Error types for the Antiphon environment abstraction.

use thiserror::Error;

/// Errors raised by collaborators at the edge of the core.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Audio output could not be acquired or a note could not be triggered
    #[error("Audio error: {0}")]
    AudioError(String),
    
    /// Sample files could not be loaded
    #[error("Sample load error: {0}")]
    SampleLoadError(String),
}

impl EnvError {
    /// Creates an audio error.
    pub fn audio(msg: impl Into<String>) -> Self {
        Self::AudioError(msg.into())
    }
    
    /// Creates a sample load error.
    pub fn sample_load(msg: impl Into<String>) -> Self {
        Self::SampleLoadError(msg.into())
    }
}
