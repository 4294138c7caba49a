//! Antiphon Core - distance-delayed call-and-response ensembles
//!
//! Players sit on a 2D board. Whatever one player plays reaches every
//! other player after a delay proportional to the distance between them.
//! Each player collects what it hears and, once it has heard enough,
//! answers with a phrase of its own, which the ensemble hears in turn.
//!
//! ```text
//!   A ──500ms──► B        A at (0,0), B at (3,4), 100 ms per unit
//!   │
//!   └──0ms────► C        C at (0,0)
//! ```
//!
//! The session lives in a [`Kit`]: a roster of [`Player`]s, a task queue
//! keyed by simulated time, and the collaborators (audio, error reporting,
//! sample loading, roster persistence) supplied by the embedding.

pub mod behavior;
pub mod error;
pub mod event;
pub mod geometry;
pub mod kit;
pub mod player;
pub mod record;
pub mod roster;
pub mod scheduler;
pub mod state;
pub mod strategy;
pub mod tonality;

pub use error::{RosterError, StateError, StrategyError};
pub use event::{phrase_duration, serial_offsets, MusicEvent, Voice};
pub use geometry::{Position, PropagationModel, DEFAULT_MS_PER_UNIT};
pub use kit::{label_for_index, Delivery, Dispatch, Kit, KitConfig, KitStats};
pub use player::{Heard, Player};
pub use record::{PlayerRecord, RecordPosition, UiState};
pub use roster::{MergeReport, NoopNotifier, Roster, RosterNotifier};
pub use scheduler::{ScheduledTask, Task, TaskQueue};
pub use state::{seed_from_text, SessionState};
pub use strategy::{ResponseStrategy, StrategySelector, HARMONIZE_RATIOS};
pub use tonality::tonality_diamond;

#[cfg(test)]
mod tests;
