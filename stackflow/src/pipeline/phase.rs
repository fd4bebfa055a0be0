//! Run state machine and run reports.

use crate::core::State;
use crate::errors::{Result, StackflowError};

/// Where a sequential run is.
///
/// `Pending(i)` moves to `Pending(i + 1)` when stage `i` succeeds, to
/// `Failed` when it fails, and to `Completed` after the last stage.
/// `Failed` and `Completed` are terminal.
#[derive(Debug)]
pub enum RunPhase {
    /// Stage `index` is next and will receive `state`.
    Pending {
        /// The next stage to run.
        index: usize,
        /// The state it receives.
        state: State,
    },
    /// A stage failed.
    Failed(StackflowError),
    /// Every stage succeeded.
    Completed(State),
}

impl RunPhase {
    /// The initial phase for a pipeline of `total` stages.
    #[must_use]
    pub fn start(state: State, total: usize) -> Self {
        if total == 0 {
            Self::Completed(state)
        } else {
            Self::Pending { index: 0, state }
        }
    }

    /// The phase after stage `index` of `total` produced `outcome`.
    #[must_use]
    pub fn transition(index: usize, total: usize, outcome: Result<State>) -> Self {
        match outcome {
            Err(err) => Self::Failed(err),
            Ok(state) if index + 1 >= total => Self::Completed(state),
            Ok(state) => Self::Pending {
                index: index + 1,
                state,
            },
        }
    }

    /// Returns true for `Failed` and `Completed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }

    /// Converts a terminal phase into the run result.
    ///
    /// # Errors
    ///
    /// The stage error for `Failed`; [`StackflowError::Internal`] if the run
    /// stopped while still pending.
    pub fn into_result(self) -> Result<State> {
        match self {
            Self::Completed(state) => Ok(state),
            Self::Failed(err) => Err(err),
            Self::Pending { index, .. } => Err(StackflowError::Internal(format!(
                "run stopped before stage {index}"
            ))),
        }
    }
}

/// Summary of a run, returned by [`Pipeline::run_report`](super::Pipeline::run_report).
#[derive(Debug)]
pub struct RunReport {
    /// The run result.
    pub outcome: Result<State>,
    /// Names of the stages that were invoked, in order. A failing stage is included.
    pub executed: Vec<String>,
    /// Number of stages in the pipeline.
    pub total: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns the number of stages invoked.
    #[must_use]
    pub fn stages_executed(&self) -> usize {
        self.executed.len()
    }

    /// Returns true if the run completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns a one-line summary, e.g. `"completed 3/3 stages in 12.0ms"`.
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = if self.succeeded() { "completed" } else { "failed after" };
        format!(
            "{verb} {}/{} stages in {:.1}ms",
            self.stages_executed(),
            self.total,
            self.duration_ms
        )
    }

    /// Returns the run result.
    pub fn into_result(self) -> Result<State> {
        self.outcome
    }
}
