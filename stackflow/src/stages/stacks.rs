//! Stages that discover, check, and reshape the stack list.

use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Stage, StageRef};
use crate::collaborators::StackDiscovery;
use crate::context::Context;
use crate::core::{Stack, StageEvent, State};
use crate::errors::{Result, StackflowError};
use crate::graph::DependencyGraph;

/// Replaces the state's stacks with what discovery finds in the project.
pub struct DetectStacks {
    discovery: Arc<dyn StackDiscovery>,
}

impl Debug for DetectStacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectStacks").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for DetectStacks {
    fn name(&self) -> &str {
        "detect_stacks"
    }

    async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        let project_dir = state.project_dir().to_path_buf();
        ctx.emit(StageEvent::info(
            "stacks.scanning",
            format!("Scanning {} for stacks...", project_dir.display()),
        ))
        .await;

        let stacks = ctx
            .guard(self.discovery.discover(ctx, &project_dir))
            .await?
            .map_err(|e| {
                StackflowError::collaborator("discover", project_dir.display().to_string(), e)
            })?;

        if stacks.is_empty() {
            return Err(StackflowError::stage(format!(
                "no stacks found in {}",
                project_dir.display()
            )));
        }

        info!(count = stacks.len(), "Detected stacks");
        ctx.emit(
            StageEvent::success("stacks.detected", format!("Found {} stack(s)", stacks.len()))
                .add_data("count", stacks.len().into()),
        )
        .await;
        Ok(state.with_stacks(stacks))
    }
}

/// Discovers the project's stacks.
pub fn detect_stacks(discovery: Arc<dyn StackDiscovery>) -> StageRef {
    Arc::new(DetectStacks { discovery })
}

/// Fails if any stack is invalid, listing every problem at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateStacks;

#[async_trait]
impl Stage for ValidateStacks {
    fn name(&self) -> &str {
        "validate_stacks"
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        let problems: Vec<String> = state
            .stacks()
            .iter()
            .filter_map(|stack| stack.validate().err())
            .map(|err| err.to_string())
            .collect();

        if problems.is_empty() {
            Ok(state)
        } else {
            Err(StackflowError::StackValidation(problems))
        }
    }
}

/// Checks every stack with [`Stack::validate`].
pub fn validate_stacks() -> StageRef {
    Arc::new(ValidateStacks)
}

/// Keeps the stacks matching a predicate.
pub struct FilterStacks<P> {
    name: String,
    predicate: P,
}

impl<P> Debug for FilterStacks<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterStacks").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<P> Stage for FilterStacks<P>
where
    P: Fn(&Stack) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        let before = state.stacks().len();
        let kept: Vec<Stack> = state
            .stacks()
            .iter()
            .filter(|stack| (self.predicate)(*stack))
            .cloned()
            .collect();
        debug!(stage = %self.name, before, after = kept.len(), "Filtered stacks");
        Ok(state.with_stacks(kept))
    }
}

/// Keeps the stacks for which `predicate` returns true, in their current order.
pub fn filter_stacks<P>(name: impl Into<String>, predicate: P) -> StageRef
where
    P: Fn(&Stack) -> bool + Send + Sync + 'static,
{
    Arc::new(FilterStacks {
        name: name.into(),
        predicate,
    })
}

/// Keeps only the stacks declaring `runtime`.
pub fn filter_by_runtime(runtime: impl Into<String>) -> StageRef {
    let runtime = runtime.into();
    filter_stacks(format!("filter_by_runtime({runtime})"), move |stack| {
        stack.runtime == runtime
    })
}

/// Rewrites every stack.
pub struct MapStacks<F> {
    name: String,
    transform: F,
}

impl<F> Debug for MapStacks<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapStacks").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for MapStacks<F>
where
    F: Fn(Stack) -> Stack + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        let mapped = state.stacks().iter().cloned().map(&self.transform).collect();
        Ok(state.with_stacks(mapped))
    }
}

/// Applies `transform` to every stack.
pub fn map_stacks<F>(name: impl Into<String>, transform: F) -> StageRef
where
    F: Fn(Stack) -> Stack + Send + Sync + 'static,
{
    Arc::new(MapStacks {
        name: name.into(),
        transform,
    })
}

/// Puts the stacks in deployment order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortByDependencies;

#[async_trait]
impl Stage for SortByDependencies {
    fn name(&self) -> &str {
        "sort_by_dependencies"
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        let graph = DependencyGraph::new(state.stacks().iter().cloned())?;
        let sorted = graph.topological_sort()?;
        debug!(
            order = ?sorted.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Sorted stacks"
        );
        Ok(state.with_stacks(sorted))
    }
}

/// Orders stacks so each comes after its dependencies.
///
/// Fails with the graph error if a dependency is missing or the stacks
/// form a cycle.
pub fn sort_by_dependencies() -> StageRef {
    Arc::new(SortByDependencies)
}

/// Reverses the stack order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseStacks;

#[async_trait]
impl Stage for ReverseStacks {
    fn name(&self) -> &str {
        "reverse_stacks"
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        let mut stacks = state.stacks().to_vec();
        stacks.reverse();
        Ok(state.with_stacks(stacks))
    }
}

/// Reverses the stacks, turning a deployment order into a teardown order.
pub fn reverse_stacks() -> StageRef {
    Arc::new(ReverseStacks)
}
