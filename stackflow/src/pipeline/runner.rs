//! Sequential execution of a pipeline.

use super::phase::{RunPhase, RunReport};
use super::Pipeline;
use crate::context::Context;
use crate::core::{StageEvent, State};
use crate::errors::Result;
use crate::observability::SpanTimer;
use crate::stages::Stage;
use tracing::{debug, info, info_span, warn, Instrument};

impl Pipeline {
    /// Runs the stages in order, threading the state through them.
    ///
    /// The first failure stops the run: later stages are never invoked. The
    /// error comes back wrapped in
    /// [`StackflowError::StageFailed`](crate::errors::StackflowError::StageFailed)
    /// with the failing stage's index and name. An empty pipeline returns the
    /// initial state as is.
    ///
    /// The context is checked before every stage, so a cancelled run fails at
    /// the next stage boundary without invoking that stage.
    pub async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        self.drive(ctx, state, &mut Vec::new()).await
    }

    /// Runs the pipeline and reports which stages ran and how long it took.
    pub async fn run_report(&self, ctx: &Context, state: State) -> RunReport {
        let timer = SpanTimer::start("pipeline");
        let mut executed = Vec::new();
        let outcome = self.drive(ctx, state, &mut executed).await;
        let report = RunReport {
            outcome,
            executed,
            total: self.len(),
            duration_ms: timer.finish(),
        };
        info!(run_id = %ctx.run_id(), "Pipeline {}", report.summary());
        report
    }

    async fn drive(&self, ctx: &Context, initial: State, executed: &mut Vec<String>) -> Result<State> {
        let total = self.stages.len();
        let mut phase = RunPhase::start(initial, total);

        while let RunPhase::Pending { index, state } = phase {
            let stage = self.stages[index].as_ref();
            let outcome = invoke(ctx, index, stage, state, executed).await;
            phase = RunPhase::transition(index, total, outcome);
        }

        phase.into_result()
    }
}

async fn invoke(
    ctx: &Context,
    index: usize,
    stage: &dyn Stage,
    state: State,
    executed: &mut Vec<String>,
) -> Result<State> {
    let name = stage.name();

    if let Err(err) = ctx.check() {
        warn!(stage = name, index, error = %err, "Stage skipped: context stopped");
        ctx.emit(StageEvent::failed(index, name, &err.to_string())).await;
        return Err(err.at_stage(index, name));
    }

    debug!(stage = name, index, "Stage started");
    ctx.emit(StageEvent::started(index, name)).await;
    executed.push(name.to_string());

    let timer = SpanTimer::start(name);
    let outcome = stage
        .run(ctx, state)
        .instrument(info_span!("stage", stage = name, index))
        .await;
    let duration_ms = timer.finish();

    match outcome {
        Ok(state) => {
            info!(stage = name, index, duration_ms, "Stage completed");
            ctx.emit(StageEvent::completed(index, name, duration_ms)).await;
            Ok(state)
        }
        Err(err) => {
            warn!(stage = name, index, duration_ms, error = %err, "Stage failed");
            ctx.emit(StageEvent::failed(index, name, &err.to_string())).await;
            Err(err.at_stage(index, name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StackflowError;
    use crate::events::CollectingEventSink;
    use crate::stages::{NoOpStage, StageRef};
    use crate::testing::mocks::{CountingStage, FailingStage, OutputStage};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_empty_pipeline_returns_initial_state() {
        let initial = State::new("/p")
            .with_output("region", serde_json::json!("eu-west-1"))
            .with_config(serde_json::json!({"namespace": "dev"}));

        let result = Pipeline::default()
            .run(&Context::new(), initial.clone())
            .await
            .unwrap();

        assert_eq!(result, initial);
        assert!(result.shares_storage_with(&initial));
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let pipeline = Pipeline::new(vec![
            Arc::new(OutputStage::new("first", "order", serde_json::json!(1))) as StageRef,
            Arc::new(OutputStage::new("second", "order", serde_json::json!(2))),
        ]);

        let result = pipeline.run(&Context::new(), State::default()).await.unwrap();
        assert_eq!(result.output("order"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_failure_short_circuits() {
        for k in 0..4 {
            let counters: Vec<Arc<CountingStage>> =
                (0..4).map(|i| Arc::new(CountingStage::new(format!("s{i}")))).collect();
            let mut stages: Vec<StageRef> = counters.iter().map(|c| c.clone() as StageRef).collect();
            stages.insert(k, Arc::new(FailingStage::new("boom", "failed on purpose")));

            let err = Pipeline::new(stages)
                .run(&Context::new(), State::default())
                .await
                .unwrap_err();

            assert_eq!(err.stage_trail(), vec![(k, "boom")]);
            for (i, counter) in counters.iter().enumerate() {
                let expected = usize::from(i < k);
                assert_eq!(counter.calls(), expected, "stage s{i} with failure at {k}");
            }
        }
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_stage() {
        let counter = Arc::new(CountingStage::new("never"));
        let ctx = Context::new();
        ctx.cancel("user abort");

        let err = Pipeline::new(vec![counter.clone() as StageRef])
            .run(&ctx, State::default())
            .await
            .unwrap_err();

        assert_eq!(counter.calls(), 0);
        assert!(err.is_cancellation());
        assert!(matches!(err.root_cause(), StackflowError::Cancelled(r) if r == "user abort"));
    }

    #[tokio::test]
    async fn test_run_emits_lifecycle_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = Context::new().with_event_sink(sink.clone());

        let pipeline = Pipeline::new(vec![
            Arc::new(NoOpStage::new("ok")) as StageRef,
            Arc::new(FailingStage::new("bad", "nope")),
        ]);
        let _ = pipeline.run(&ctx, State::default()).await;

        let kinds: Vec<String> = sink.events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec!["stage.started", "stage.completed", "stage.started", "stage.failed"]
        );
    }

    #[tokio::test]
    async fn test_run_report() {
        let pipeline = Pipeline::new(vec![
            Arc::new(NoOpStage::new("a")) as StageRef,
            Arc::new(FailingStage::new("b", "nope")),
            Arc::new(NoOpStage::new("c")),
        ]);

        let report = pipeline.run_report(&Context::new(), State::default()).await;

        assert!(!report.succeeded());
        assert_eq!(report.executed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(report.total, 3);
        assert!(report.into_result().is_err());
    }
}
