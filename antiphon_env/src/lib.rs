//! Antiphon Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary that lets the Antiphon
//! ensemble core run against a real clock and audio backend, or inside a
//! deterministic simulation.
//!
//! # Core Concept
//!
//! Everything the core does not own is reached through a trait:
//! - Time pacing (`AntiphonContext::now()`, `sleep()`)
//! - Audio output (`AudioSink`)
//! - Sample loading (`SampleLoader`)
//! - Error display (`ErrorReporter`)
//!
//! # Example
//!
//! ```ignore
//! use antiphon_env::{AntiphonContext, TokioContext};
//!
//! async fn wait_for<Ctx: AntiphonContext>(ctx: &Ctx, due: Duration) {
//!     let now = ctx.now();
//!     if due > now {
//!         ctx.sleep(due - now).await;
//!     }
//! }
//! ```

mod collaborators;
mod context;
mod error;
mod tokio_impl;
mod types;

pub use collaborators::{
    AudioSink, CollectingReporter, ErrorReporter, LogReporter, NullAudio, RecordingSink,
    SampleLoader, StaticLoader,
};
pub use context::AntiphonContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::{PlayRequest, PlayerId};
