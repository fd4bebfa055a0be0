//! Core domain model types for stackflow.
//!
//! This module contains the values the engine moves around:
//! - Stacks and their runtime classification
//! - Build artifacts
//! - The pipeline state
//! - Stage events

mod artifact;
mod event;
mod stack;
mod state;

pub use artifact::Artifact;
pub use event::{EventLevel, StageEvent};
pub use stack::{RuntimeFamily, Stack, SUPPORTED_RUNTIMES};
pub use state::State;
