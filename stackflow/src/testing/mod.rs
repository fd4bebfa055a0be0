//! Testing utilities for stackflow pipelines.
//!
//! This module provides:
//! - Mock stages (counting, failing, slow, cancellation-aware loops)
//! - Stack fixtures for common graph shapes
//! - Assertions for orderings and structured errors

pub mod assertions;
pub mod fixtures;
pub mod mocks;

pub use assertions::{assert_dependencies_first, assert_failed_at, assert_merge_conflict};
pub use fixtures::{chain, collecting_context, diamond, stack, state_with};
pub use mocks::{
    ArtifactStage, BusyLoopStage, CountingStage, FailingStage, OutputStage, RecordingStage,
    SlowStage,
};
