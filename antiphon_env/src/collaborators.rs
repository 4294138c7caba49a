//! Collaborator interfaces the core calls out to.
//!
//! The ensemble core decides *what* should sound and *what* went wrong;
//! these traits are where that leaves the core. Audio rendering, sample
//! downloading and user-facing error display all live behind them.
//!
//! ```text
//!   hear() ──(selected)──► AudioSink::trigger(PlayRequest)
//!   play() ──(first use)─► SampleLoader::load(base, files)
//!   merge/audio failure ─► ErrorReporter::report(error)
//! ```

use crate::error::EnvError;
use crate::types::PlayRequest;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// Destination for notes the core wants to be heard.
pub trait AudioSink: Send {
    /// Realizes one note. Failure is reported by the caller and never
    /// stops event propagation.
    fn trigger(&mut self, request: &PlayRequest) -> Result<(), EnvError>;
}

/// Receives non-fatal errors surfaced by the core.
pub trait ErrorReporter: Send {
    /// Reports an error to whoever is watching.
    fn report(&self, error: &dyn Error);
}

/// Loads the sample bank used to voice events.
pub trait SampleLoader: Send {
    /// Loads `files` relative to `base`, returning one handle per file in order.
    fn load(&mut self, base: &str, files: &[String]) -> Result<Vec<String>, EnvError>;
}

// =============================================================================
// STOCK IMPLEMENTATIONS
// =============================================================================

/// Audio sink that discards every note.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn trigger(&mut self, _request: &PlayRequest) -> Result<(), EnvError> {
        Ok(())
    }
}

/// Audio sink that records every note it is asked to play.
///
/// Clones share the same log, so a handle kept outside the kit sees what
/// the kit triggered.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    played: Arc<Mutex<Vec<PlayRequest>>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Returns a snapshot of everything played so far.
    pub fn played(&self) -> Vec<PlayRequest> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }
    
    /// Returns the number of notes played so far.
    pub fn len(&self) -> usize {
        self.played.lock().map(|p| p.len()).unwrap_or(0)
    }
    
    /// True if nothing has been played yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AudioSink for RecordingSink {
    fn trigger(&mut self, request: &PlayRequest) -> Result<(), EnvError> {
        let mut played = self
            .played
            .lock()
            .map_err(|_| EnvError::audio("recording sink poisoned"))?;
        played.push(request.clone());
        Ok(())
    }
}

/// Error reporter that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &dyn Error) {
        tracing::warn!("{}", error);
    }
}

/// Error reporter that keeps the rendered messages.
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CollectingReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Returns the messages reported so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, error: &dyn Error) {
        tracing::warn!("{}", error);
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(error.to_string());
        }
    }
}

/// Sample loader that "loads" by naming: each handle is `base/file`.
///
/// Used when no real audio backend is present; the core only ever needs
/// the number of samples and a stable handle for each.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticLoader;

impl SampleLoader for StaticLoader {
    fn load(&mut self, base: &str, files: &[String]) -> Result<Vec<String>, EnvError> {
        Ok(files
            .iter()
            .map(|file| format!("{}/{}", base.trim_end_matches('/'), file))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    
    fn request(pitch: f64) -> PlayRequest {
        PlayRequest {
            pitch,
            pan: 0.0,
            amp: 0.5,
            sample_index: 0,
            duration: Duration::from_secs(2),
            at: Duration::ZERO,
        }
    }
    
    #[test]
    fn test_recording_sink_shares_log_across_clones() {
        let sink = RecordingSink::new();
        let mut handle = sink.clone();
        
        handle.trigger(&request(1.5)).unwrap();
        handle.trigger(&request(1.25)).unwrap();
        
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.played()[1].pitch, 1.25);
    }
    
    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::new();
        reporter.report(&EnvError::sample_load("timpani-d.wav missing"));
        
        assert_eq!(
            reporter.messages(),
            vec!["Sample load error: timpani-d.wav missing".to_string()]
        );
    }
    
    #[test]
    fn test_static_loader_names_handles() {
        let mut loader = StaticLoader;
        let handles = loader
            .load("samples/", &["trumpet-D2.wav".to_string()])
            .unwrap();
        
        assert_eq!(handles, vec!["samples/trumpet-D2.wav".to_string()]);
    }
}
