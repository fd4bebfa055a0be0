//! Standard deploy and destroy pipelines.
//!
//! A deploy is discovery, then builds, then infrastructure:
//!
//! ```text
//! detect_stacks -> validate_stacks -> sort_by_dependencies
//!   -> build_all
//!   -> infra_init -> infra_plan -> infra_apply -> capture_outputs
//! ```
//!
//! A destroy shares the discovery part and finishes with `infra_init` and
//! `infra_destroy`.

use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::collaborators::{ApprovalPrompt, BuilderRegistry, InfraExecutor, StackDiscovery};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::core::State;
use crate::errors::Result;
use crate::pipeline::Pipeline;
use crate::stages::build::{build_all, BuildSettings};
use crate::stages::infra::{
    capture_outputs, infra_apply, infra_destroy, infra_init, infra_plan, InfraSettings,
};
use crate::stages::stacks::{detect_stacks, sort_by_dependencies, validate_stacks};

/// The external services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Finds the project's stacks.
    pub discovery: Arc<dyn StackDiscovery>,
    /// Builders by runtime.
    pub builders: Arc<BuilderRegistry>,
    /// Infrastructure tool.
    pub executor: Arc<dyn InfraExecutor>,
    /// Asked before apply and destroy.
    pub approval: Arc<dyn ApprovalPrompt>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("builders", &self.builders)
            .finish_non_exhaustive()
    }
}

/// Detect, validate and order the stacks.
pub fn discovery_pipeline(collaborators: &Collaborators) -> Pipeline {
    Pipeline::new([
        detect_stacks(Arc::clone(&collaborators.discovery)),
        validate_stacks(),
        sort_by_dependencies(),
    ])
}

/// The full deploy: discovery, builds, then init/plan/apply/outputs.
pub fn deploy_pipeline(collaborators: &Collaborators, config: &EngineConfig) -> Pipeline {
    let infra = InfraSettings::from_config(config);
    let executor = &collaborators.executor;

    Pipeline::chain([
        discovery_pipeline(collaborators),
        Pipeline::new([build_all(
            Arc::clone(&collaborators.builders),
            BuildSettings::from_config(config),
        )]),
        Pipeline::new([
            infra_init(Arc::clone(executor)),
            infra_plan(Arc::clone(executor), infra.clone()),
            infra_apply(
                Arc::clone(executor),
                Arc::clone(&collaborators.approval),
                infra,
            ),
            capture_outputs(Arc::clone(executor)),
        ]),
    ])
}

/// Tears everything down, dependents first.
pub fn destroy_pipeline(collaborators: &Collaborators, config: &EngineConfig) -> Pipeline {
    let executor = &collaborators.executor;
    Pipeline::chain([
        discovery_pipeline(collaborators),
        Pipeline::new([
            infra_init(Arc::clone(executor)),
            infra_destroy(
                Arc::clone(executor),
                Arc::clone(&collaborators.approval),
                InfraSettings::from_config(config),
            ),
        ]),
    ])
}

/// The starting state for a run: the project root plus the serialized config.
pub fn initial_state(config: &EngineConfig) -> Result<State> {
    Ok(State::new(&config.project_dir).with_config(config.to_value()?))
}

/// Applies the configured run deadline to `ctx`.
#[must_use]
pub fn run_context(ctx: Context, config: &EngineConfig) -> Context {
    match config.stage_timeout() {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx,
    }
}

/// Runs a deploy with `config`.
pub async fn deploy(collaborators: &Collaborators, config: &EngineConfig, ctx: &Context) -> Result<State> {
    let ctx = run_context(ctx.clone(), config);
    info!(run_id = %ctx.run_id(), project = %config.project_dir.display(), "Starting deploy");
    deploy_pipeline(collaborators, config)
        .run(&ctx, initial_state(config)?)
        .await
}

/// Runs a destroy with `config`.
pub async fn destroy(collaborators: &Collaborators, config: &EngineConfig, ctx: &Context) -> Result<State> {
    let ctx = run_context(ctx.clone(), config);
    info!(run_id = %ctx.run_id(), project = %config.project_dir.display(), "Starting destroy");
    destroy_pipeline(collaborators, config)
        .run(&ctx, initial_state(config)?)
        .await
}
