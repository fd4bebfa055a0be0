//! Pipeline composition and execution.
//!
//! This module provides:
//! - [`Pipeline`]: an ordered list of stages with `run` and `chain`
//! - [`parallel`] and [`sequential`] combinators that turn stage lists into a single stage
//! - [`RunPhase`] and [`RunReport`] describing a run

mod merge;
mod parallel;
mod phase;
mod runner;
mod sequential;

pub use merge::merge_branches;
pub use parallel::{parallel, ParallelStage};
pub use phase::{RunPhase, RunReport};
pub use sequential::{sequential, SequentialStage};

use crate::stages::StageRef;

/// An ordered list of stages.
///
/// Building a pipeline never inspects the stages; everything happens in
/// [`Pipeline::run`].
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<StageRef>,
}

impl Pipeline {
    /// Creates a pipeline from stages in run order.
    pub fn new(stages: impl IntoIterator<Item = StageRef>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
        }
    }

    /// Concatenates pipelines into one flat pipeline, in argument order.
    ///
    /// Chaining is associative and the chain of no pipelines is empty.
    pub fn chain(pipelines: impl IntoIterator<Item = Pipeline>) -> Self {
        Self {
            stages: pipelines.into_iter().flat_map(|p| p.stages).collect(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn then(mut self, stage: StageRef) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns the stages.
    #[must_use]
    pub fn stages(&self) -> &[StageRef] {
        &self.stages
    }

    /// Returns the stage names in run order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if there are no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FromIterator<StageRef> for Pipeline {
    fn from_iter<I: IntoIterator<Item = StageRef>>(iter: I) -> Self {
        Self::new(iter)
    }
}
