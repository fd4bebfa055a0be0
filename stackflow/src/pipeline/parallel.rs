//! Concurrent fan-out/fan-in combinator.

use super::merge::merge_branches;
use crate::context::Context;
use crate::core::{StageEvent, State};
use crate::errors::{Result, StackflowError};
use crate::stages::{Stage, StageRef};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Runs its branches concurrently on copies of the same state and merges
/// what they wrote.
///
/// Each branch runs in its own tokio task with a child of the caller's
/// context. The first branch failure cancels that child context, aborts the
/// remaining tasks and is returned wrapped with the branch's index and name;
/// nothing is merged. Dropping the stage's future before it completes
/// cancels the branch context and aborts every branch task. On success, artifacts and outputs written by the
/// branches are unioned over the incoming state (see
/// [`merge_branches`](super::merge_branches)), and two branches writing the
/// same key fail the stage with a merge conflict.
#[derive(Debug)]
pub struct ParallelStage {
    name: String,
    branches: Vec<StageRef>,
}

impl ParallelStage {
    /// Creates a parallel stage named after its branches.
    pub fn new(branches: impl IntoIterator<Item = StageRef>) -> Self {
        let branches: Vec<StageRef> = branches.into_iter().collect();
        let names: Vec<&str> = branches.iter().map(|b| b.name()).collect();
        Self {
            name: format!("parallel({})", names.join(", ")),
            branches,
        }
    }

    /// Overrides the stage name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the branches.
    #[must_use]
    pub fn branches(&self) -> &[StageRef] {
        &self.branches
    }
}

/// Combines stages into one stage that runs them concurrently.
pub fn parallel(stages: impl IntoIterator<Item = StageRef>) -> StageRef {
    Arc::new(ParallelStage::new(stages))
}

/// Cancels the branch scope if the fan-out is dropped before it settles.
struct ScopeGuard {
    scope: Context,
    armed: bool,
}

impl ScopeGuard {
    const fn new(scope: Context) -> Self {
        Self { scope, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.armed {
            self.scope.cancel("parallel stage dropped");
        }
    }
}

#[async_trait]
impl Stage for ParallelStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        if self.branches.is_empty() {
            return Ok(state);
        }
        ctx.check()?;

        let scope = ctx.child();
        debug!(stage = %self.name, branches = self.branches.len(), "Parallel fan-out");

        let mut guard = ScopeGuard::new(scope.clone());

        // Declared after the guard so it drops first, aborting the tasks
        // before their context is cancelled.
        let mut tasks: JoinSet<(usize, Result<State>)> = JoinSet::new();
        for (i, branch) in self.branches.iter().enumerate() {
            let branch = Arc::clone(branch);
            let ctx = scope.clone();
            let snapshot = state.clone();
            tasks.spawn(async move {
                let outcome = branch.run(&ctx, snapshot).await;
                (i, outcome)
            });
        }

        let mut results: Vec<Option<State>> = (0..self.branches.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((i, Ok(branch_state))) => {
                    results[i] = Some(branch_state);
                    continue;
                }
                Ok((i, Err(err))) => err.at_stage(i, self.branches[i].name()),
                Err(join_err) => {
                    StackflowError::Internal(format!("parallel branch did not finish: {join_err}"))
                }
            };

            scope.cancel(format!("parallel branch failed: {failure}"));
            guard.disarm();
            tasks.abort_all();
            warn!(stage = %self.name, error = %failure, "Parallel branch failed");
            return Err(failure);
        }

        guard.disarm();

        let mut finished = Vec::with_capacity(self.branches.len());
        for (branch, result) in self.branches.iter().zip(results) {
            let branch_state = result.ok_or_else(|| {
                StackflowError::Internal(format!("parallel branch '{}' produced no state", branch.name()))
            })?;
            finished.push((branch.name(), branch_state));
        }

        match merge_branches(&state, &finished) {
            Ok(merged) => {
                debug!(
                    stage = %self.name,
                    artifacts = merged.artifacts().len(),
                    outputs = merged.outputs().len(),
                    "Parallel branches merged"
                );
                ctx.emit(
                    StageEvent::info("parallel.merged", format!("{} branches merged", finished.len()))
                        .add_data("stage", serde_json::json!(self.name)),
                )
                .await;
                Ok(merged)
            }
            Err(conflict) => {
                warn!(stage = %self.name, error = %conflict, "Parallel merge conflict");
                ctx.emit(
                    StageEvent::error("parallel.conflict", conflict.to_string())
                        .add_data("key", serde_json::json!(conflict.key))
                        .add_data("kind", serde_json::json!(conflict.kind)),
                )
                .await;
                Err(conflict.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MergeKind;
    use crate::events::CollectingEventSink;
    use crate::testing::mocks::{ArtifactStage, BusyLoopStage, FailingStage, RecordingStage, SlowStage};
    use std::time::Duration;

    #[tokio::test]
    async fn test_distinct_artifacts_are_merged() {
        let stage = parallel(vec![
            Arc::new(ArtifactStage::new("build:api", "api")) as StageRef,
            Arc::new(ArtifactStage::new("build:worker", "worker")),
        ]);

        let result = stage.run(&Context::new(), State::new("/p")).await.unwrap();

        assert!(result.artifact("api").is_some());
        assert!(result.artifact("worker").is_some());
        assert_eq!(result.artifacts().len(), 2);
    }

    #[tokio::test]
    async fn test_same_artifact_key_is_a_conflict() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = Context::new().with_event_sink(sink.clone());
        let stage = parallel(vec![
            Arc::new(ArtifactStage::new("one", "api")) as StageRef,
            Arc::new(ArtifactStage::new("two", "api")),
        ]);

        let err = stage.run(&ctx, State::default()).await.unwrap_err();

        let conflict = err.as_merge_conflict().expect("merge conflict");
        assert_eq!(conflict.kind, MergeKind::Artifact);
        assert_eq!(conflict.key, "api");
        assert_eq!((conflict.first_branch.as_str(), conflict.second_branch.as_str()), ("one", "two"));
        assert_eq!(sink.events_of_type("parallel.conflict").len(), 1);
    }

    #[tokio::test]
    async fn test_branches_run_concurrently() {
        let stage = parallel(
            (0..4).map(|i| Arc::new(SlowStage::new(format!("slow{i}"), Duration::from_millis(100))) as StageRef),
        );

        let started = tokio::time::Instant::now();
        stage.run(&Context::new(), State::default()).await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_branches_see_the_same_snapshot() {
        let first = Arc::new(RecordingStage::new("first"));
        let second = Arc::new(RecordingStage::new("second"));
        let initial = State::new("/p").with_output("seed", serde_json::json!(1));

        parallel(vec![first.clone() as StageRef, second.clone()])
            .run(&Context::new(), initial.clone())
            .await
            .unwrap();

        assert_eq!(first.seen(), vec![initial.clone()]);
        assert_eq!(second.seen(), vec![initial]);
    }

    #[tokio::test]
    async fn test_first_failure_cancels_siblings() {
        let busy = Arc::new(BusyLoopStage::new("busy"));
        let stage = parallel(vec![
            busy.clone() as StageRef,
            Arc::new(FailingStage::new("fails", "broken build")),
        ]);

        let err = tokio::time::timeout(Duration::from_secs(2), stage.run(&Context::new(), State::default()))
            .await
            .expect("parallel stage should return promptly")
            .unwrap_err();

        assert_eq!(err.stage_trail(), vec![(1, "fails")]);
        assert!(err.to_string().contains("broken build"));
    }

    #[tokio::test]
    async fn test_branch_failure_does_not_cancel_caller() {
        let ctx = Context::new();
        let stage = parallel(vec![Arc::new(FailingStage::new("fails", "x")) as StageRef]);

        let _ = stage.run(&ctx, State::default()).await;
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_caller_cancellation_reaches_branches() {
        let ctx = Context::new();
        let stage = parallel(vec![Arc::new(BusyLoopStage::new("busy")) as StageRef]);

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel("shutdown");
        });

        let err = tokio::time::timeout(Duration::from_secs(2), stage.run(&ctx, State::default()))
            .await
            .expect("cancellation should stop the branch")
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn test_dropping_the_stage_stops_its_branches() {
        let busy = Arc::new(BusyLoopStage::new("busy"));
        let stage = parallel(vec![busy.clone() as StageRef]);

        let outcome =
            tokio::time::timeout(Duration::from_millis(50), stage.run(&Context::new(), State::default())).await;
        assert!(outcome.is_err());

        let at_drop = busy.iterations();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(busy.iterations() <= at_drop + 1);
    }

    #[tokio::test]
    async fn test_dropping_the_stage_cancels_the_branch_scope() {
        let ctx = Context::new();
        let seen = Arc::new(parking_lot::Mutex::new(None::<Context>));
        let capture = {
            let seen = seen.clone();
            crate::stages::stage_fn("capture", move |branch_ctx: Context, state: State| {
                *seen.lock() = Some(branch_ctx);
                async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(state)
                }
            })
        };

        let outcome =
            tokio::time::timeout(Duration::from_millis(50), parallel(vec![capture]).run(&ctx, State::default())).await;
        assert!(outcome.is_err());

        let branch_ctx = seen.lock().clone().expect("branch started");
        assert!(branch_ctx.is_cancelled());
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_repeated_runs_do_not_accumulate_children() {
        let ctx = Context::new();
        let stage = parallel(vec![Arc::new(ArtifactStage::new("a", "a")) as StageRef]);

        for _ in 0..50 {
            stage.run(&ctx, State::default()).await.unwrap();
        }
        assert_eq!(ctx.token().live_children(), 0);
    }

    #[tokio::test]
    async fn test_empty_parallel_is_identity() {
        let state = State::new("/p");
        let result = parallel(Vec::new()).run(&Context::new(), state.clone()).await.unwrap();
        assert!(result.shares_storage_with(&state));
    }

    #[test]
    fn test_name_lists_branches() {
        let stage = ParallelStage::new(vec![
            Arc::new(ArtifactStage::new("a", "a")) as StageRef,
            Arc::new(ArtifactStage::new("b", "b")),
        ]);
        assert_eq!(stage.name(), "parallel(a, b)");
        assert_eq!(stage.named("build-wave-0").name(), "build-wave-0");
    }
}
