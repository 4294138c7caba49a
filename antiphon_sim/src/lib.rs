//! Antiphon deterministic simulation harness
//!
//! Runs ensemble sessions without audio hardware or wall-clock waits, so
//! the same seed always produces the same performance.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                     SimWorld                      │
//! │  ┌──────────────┐    ┌─────────────────────────┐  │
//! │  │  SimContext  │◄───│ Kit (roster + tasks)    │  │
//! │  │ virtual clock│    └──────┬─────────┬────────┘  │
//! │  └──────────────┘           │         │           │
//! │                    RecordingSink  CollectingReporter
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use antiphon_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4).run(ScenarioId::Triangle);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod pace;
mod runner;
pub mod scenarios;
mod session;
mod world;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{DeliveryRecord, NoteRecord, PlayerSnapshot, SimExport};
pub use pace::Pacer;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use session::{export_session, load_state, play_session};
pub use world::{Layout, SimConfig, SimWorld};
