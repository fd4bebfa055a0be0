//! Sequential composite stage.

use super::Pipeline;
use crate::context::Context;
use crate::core::State;
use crate::errors::Result;
use crate::stages::{Stage, StageRef};
use async_trait::async_trait;
use std::sync::Arc;

/// A stage that runs a nested pipeline.
///
/// Failures keep the nested stage position, so the error trail reads from
/// the outer stage inwards.
#[derive(Debug, Clone)]
pub struct SequentialStage {
    name: String,
    pipeline: Pipeline,
}

impl SequentialStage {
    /// Creates a sequential stage.
    pub fn new(name: impl Into<String>, stages: impl IntoIterator<Item = StageRef>) -> Self {
        Self {
            name: name.into(),
            pipeline: Pipeline::new(stages),
        }
    }

    /// Returns the nested pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

/// Combines stages into one stage that runs them in order.
pub fn sequential(stages: impl IntoIterator<Item = StageRef>) -> StageRef {
    let stages: Vec<StageRef> = stages.into_iter().collect();
    let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
    let name = format!("sequential({})", names.join(", "));
    Arc::new(SequentialStage::new(name, stages))
}

#[async_trait]
impl Stage for SequentialStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        self.pipeline.run(ctx, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{CountingStage, FailingStage, OutputStage};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_sequential_threads_state() {
        let stage = sequential(vec![
            Arc::new(OutputStage::new("a", "x", serde_json::json!(1))) as StageRef,
            Arc::new(OutputStage::new("b", "y", serde_json::json!(2))),
        ]);

        let state = stage.run(&Context::new(), State::default()).await.unwrap();
        assert_eq!(state.outputs().len(), 2);
        assert_eq!(stage.name(), "sequential(a, b)");
    }

    #[tokio::test]
    async fn test_sequential_short_circuits_and_nests_trail() {
        let after = Arc::new(CountingStage::new("after"));
        let inner = sequential(vec![
            Arc::new(FailingStage::new("bad", "x")) as StageRef,
            after.clone(),
        ]);
        let outer = Pipeline::new(vec![Arc::new(CountingStage::new("before")) as StageRef, inner]);

        let err = outer.run(&Context::new(), State::default()).await.unwrap_err();

        assert_eq!(after.calls(), 0);
        assert_eq!(err.stage_trail(), vec![(1, "sequential(bad, after)"), (0, "bad")]);
    }
}
