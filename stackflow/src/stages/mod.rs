//! Stage trait and implementations.
//!
//! Stages are the units of work in a stackflow pipeline. Each one takes the
//! current [`State`] and returns the next one, or an error that stops the run.
//!
//! The submodules hold the stages a deploy is assembled from:
//! - [`stacks`]: discovery, validation, filtering and ordering of stacks
//! - [`build`]: building artifacts through a [`BuilderRegistry`](crate::collaborators::BuilderRegistry)
//! - [`infra`]: init/plan/apply/destroy/outputs through an [`InfraExecutor`](crate::collaborators::InfraExecutor)

pub mod build;
pub mod infra;
pub mod stacks;

use crate::context::Context;
use crate::core::State;
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// A stage must not keep the state it was given after returning. It should
/// check `ctx` before and between any slow external calls and return the
/// cancellation error promptly.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Transforms the state.
    async fn run(&self, ctx: &Context, state: State) -> Result<State>;
}

/// Shared handle to a stage.
pub type StageRef = Arc<dyn Stage>;

/// An async closure stage.
pub struct FnStage<F, Fut>
where
    F: Fn(Context, State) -> Fut + Send + Sync,
    Fut: Future<Output = Result<State>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnStage<F, Fut>
where
    F: Fn(Context, State) -> Fut + Send + Sync,
    Fut: Future<Output = Result<State>> + Send,
{
    /// Creates a new closure stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnStage<F, Fut>
where
    F: Fn(Context, State) -> Fut + Send + Sync,
    Fut: Future<Output = Result<State>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for FnStage<F, Fut>
where
    F: Fn(Context, State) -> Fut + Send + Sync,
    Fut: Future<Output = Result<State>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        (self.func)(ctx.clone(), state).await
    }
}

/// Wraps an async closure as a shared stage.
pub fn stage_fn<F, Fut>(name: impl Into<String>, func: F) -> StageRef
where
    F: Fn(Context, State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<State>> + Send + 'static,
{
    Arc::new(FnStage::new(name, func))
}

/// A stage that returns its input untouched.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StackflowError;

    #[tokio::test]
    async fn test_noop_stage_returns_input() {
        let stage = NoOpStage::new("noop");
        let state = State::new("/p").with_output("k", serde_json::json!(1));

        let out = stage.run(&Context::new(), state.clone()).await.unwrap();

        assert_eq!(stage.name(), "noop");
        assert!(out.shares_storage_with(&state));
    }

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("tag", |_ctx, state: State| async move {
            Ok(state.with_output("tagged", serde_json::json!(true)))
        });

        let out = stage.run(&Context::new(), State::default()).await.unwrap();
        assert_eq!(out.output("tagged"), Some(&serde_json::json!(true)));
        assert!(format!("{stage:?}").contains("tag"));
    }

    #[tokio::test]
    async fn test_fn_stage_error() {
        let stage = stage_fn("fail", |_ctx, _state| async {
            Err(StackflowError::stage("nope"))
        });

        let err = stage.run(&Context::new(), State::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Stage execution error: nope");
    }

    #[tokio::test]
    async fn test_fn_stage_sees_context() {
        let stage = stage_fn("guarded", |ctx: Context, state| async move {
            ctx.check()?;
            Ok(state)
        });

        let ctx = Context::new();
        ctx.cancel("stop");
        assert!(stage.run(&ctx, State::default()).await.unwrap_err().is_cancellation());
    }
}
