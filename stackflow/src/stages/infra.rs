//! Infrastructure stages.
//!
//! Each stage walks the state's stacks in order and runs one executor
//! operation in every stack directory. Destroy walks them backwards. The
//! context is checked before every stack, and collaborator errors are
//! reported with the operation and stack name.

use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::info;

use super::{Stage, StageRef};
use crate::collaborators::{ApprovalPrompt, InfraExecutor, PlanVars};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::core::{Stack, StageEvent, State};
use crate::errors::{Result, StackflowError};

/// Options shared by the infra stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfraSettings {
    /// Skip the approval prompt.
    pub auto_approve: bool,
    /// Namespace for ephemeral environments.
    pub namespace: Option<String>,
    /// Extra variables for plan, apply and destroy.
    pub vars: PlanVars,
}

impl InfraSettings {
    /// Settings with approval required and no variables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes approval and namespace from `config`.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            auto_approve: config.auto_approve,
            namespace: config.namespace.clone(),
            vars: PlanVars::new(),
        }
    }

    /// Sets auto-approve.
    #[must_use]
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds a variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Variables passed to the executor.
    ///
    /// A namespace becomes the `namespace` variable holding the resource
    /// prefix (`"pr-42-"`).
    #[must_use]
    pub fn plan_vars(&self) -> PlanVars {
        let mut vars = self.vars.clone();
        if let Some(ns) = &self.namespace {
            vars.insert("namespace".to_string(), format!("{ns}-"));
        }
        vars
    }
}

/// The executor operation a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraOperation {
    /// Prepare working directories.
    Init,
    /// Compute plans.
    Plan,
    /// Apply changes.
    Apply,
    /// Tear down, in reverse order.
    Destroy,
    /// Read outputs into the state.
    Outputs,
}

impl InfraOperation {
    /// Name used for the stage and in errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Outputs => "output",
        }
    }

    fn stage_name(self) -> &'static str {
        match self {
            Self::Init => "infra_init",
            Self::Plan => "infra_plan",
            Self::Apply => "infra_apply",
            Self::Destroy => "infra_destroy",
            Self::Outputs => "capture_outputs",
        }
    }
}

/// Runs one executor operation over every stack.
pub struct InfraStage {
    operation: InfraOperation,
    executor: Arc<dyn InfraExecutor>,
    approval: Option<Arc<dyn ApprovalPrompt>>,
    settings: InfraSettings,
}

impl Debug for InfraStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraStage")
            .field("operation", &self.operation)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl InfraStage {
    fn new(operation: InfraOperation, executor: Arc<dyn InfraExecutor>) -> Self {
        Self {
            operation,
            executor,
            approval: None,
            settings: InfraSettings::default(),
        }
    }

    /// Returns the operation.
    #[must_use]
    pub fn operation(&self) -> InfraOperation {
        self.operation
    }

    fn failed(&self, stack: &Stack, err: anyhow::Error) -> StackflowError {
        StackflowError::collaborator(self.operation.as_str(), &stack.name, err)
    }

    /// Asks for approval unless auto-approve is set.
    async fn confirm(&self, ctx: &Context, stacks: &[Stack]) -> Result<()> {
        if self.settings.auto_approve {
            return Ok(());
        }
        let action = self.operation.as_str();
        let Some(approval) = &self.approval else {
            return Err(StackflowError::Config(format!(
                "{action} needs approval but no approval prompt is configured"
            )));
        };

        let approved = ctx
            .guard(approval.approve(ctx, action, stacks))
            .await?
            .map_err(|e| StackflowError::collaborator("approval", action, e))?;

        if approved {
            Ok(())
        } else {
            let what = match self.operation {
                InfraOperation::Destroy => "destroy",
                _ => "deployment",
            };
            Err(StackflowError::stage(format!("{what} canceled by user")))
        }
    }

    async fn init(&self, ctx: &Context, state: State) -> Result<State> {
        for stack in state.stacks() {
            ctx.check()?;
            ctx.emit(StageEvent::info(
                "infra.init",
                format!("[{}] Initializing...", stack.name),
            ))
            .await;
            ctx.guard(self.executor.init(ctx, &stack.absolute_path))
                .await?
                .map_err(|e| self.failed(stack, e))?;
        }
        Ok(state)
    }

    async fn plan(&self, ctx: &Context, state: State) -> Result<State> {
        let vars = self.settings.plan_vars();
        let mut changed = 0usize;

        for stack in state.stacks() {
            ctx.check()?;
            let has_changes = ctx
                .guard(self.executor.plan(ctx, &stack.absolute_path, &vars))
                .await?
                .map_err(|e| self.failed(stack, e))?;
            if has_changes {
                changed += 1;
                ctx.emit(StageEvent::info(
                    "infra.plan.changes",
                    format!("[{}] Changes detected", stack.name),
                ))
                .await;
            }
        }

        if changed == 0 {
            ctx.emit(StageEvent::success(
                "infra.plan.clean",
                "No changes detected in any stack",
            ))
            .await;
        }
        info!(stacks = state.stacks().len(), changed, "Planned infrastructure");
        Ok(state)
    }

    async fn apply(&self, ctx: &Context, state: State) -> Result<State> {
        let stacks = state.stacks();
        if stacks.is_empty() {
            return Ok(state);
        }
        self.confirm(ctx, stacks).await?;

        let vars = self.settings.plan_vars();
        let total = stacks.len();
        for (i, stack) in stacks.iter().enumerate() {
            ctx.check()?;
            ctx.emit(StageEvent::info(
                "infra.apply",
                format!("[{}/{}] Applying {}...", i + 1, total, stack.name),
            ))
            .await;
            ctx.guard(self.executor.apply(ctx, &stack.absolute_path, &vars))
                .await?
                .map_err(|e| self.failed(stack, e))?;
        }

        ctx.emit(StageEvent::success(
            "infra.applied",
            format!("Applied {total} stack(s)"),
        ))
        .await;
        Ok(state)
    }

    async fn destroy(&self, ctx: &Context, state: State) -> Result<State> {
        let stacks = state.stacks();
        if stacks.is_empty() {
            return Ok(state);
        }
        self.confirm(ctx, stacks).await?;

        let vars = self.settings.plan_vars();
        let total = stacks.len();
        for (k, stack) in stacks.iter().rev().enumerate() {
            ctx.check()?;
            ctx.emit(StageEvent::info(
                "infra.destroy",
                format!("[{}/{}] Destroying {}...", k + 1, total, stack.name),
            ))
            .await;
            ctx.guard(self.executor.destroy(ctx, &stack.absolute_path, &vars))
                .await?
                .map_err(|e| self.failed(stack, e))?;
        }

        ctx.emit(StageEvent::success(
            "infra.destroyed",
            format!("Destroyed {total} stack(s)"),
        ))
        .await;
        Ok(state)
    }

    async fn outputs(&self, ctx: &Context, state: State) -> Result<State> {
        let mut captured = Vec::with_capacity(state.stacks().len());
        for stack in state.stacks() {
            ctx.check()?;
            let outputs = ctx
                .guard(self.executor.output(ctx, &stack.absolute_path))
                .await?
                .map_err(|e| self.failed(stack, e))?;
            captured.push((stack.name.clone(), serde_json::Value::Object(outputs)));
        }

        Ok(captured
            .into_iter()
            .fold(state, |state, (name, outputs)| state.with_output(name, outputs)))
    }
}

#[async_trait]
impl Stage for InfraStage {
    fn name(&self) -> &str {
        self.operation.stage_name()
    }

    async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        match self.operation {
            InfraOperation::Init => self.init(ctx, state).await,
            InfraOperation::Plan => self.plan(ctx, state).await,
            InfraOperation::Apply => self.apply(ctx, state).await,
            InfraOperation::Destroy => self.destroy(ctx, state).await,
            InfraOperation::Outputs => self.outputs(ctx, state).await,
        }
    }
}

/// Initializes every stack directory.
pub fn infra_init(executor: Arc<dyn InfraExecutor>) -> StageRef {
    Arc::new(InfraStage::new(InfraOperation::Init, executor))
}

/// Plans every stack. Reports when nothing would change.
pub fn infra_plan(executor: Arc<dyn InfraExecutor>, settings: InfraSettings) -> StageRef {
    Arc::new(InfraStage {
        settings,
        ..InfraStage::new(InfraOperation::Plan, executor)
    })
}

/// Applies every stack in order.
///
/// Unless `settings.auto_approve` is set, `approval` is asked first and a
/// refusal fails the stage with `"deployment canceled by user"`.
pub fn infra_apply(
    executor: Arc<dyn InfraExecutor>,
    approval: Arc<dyn ApprovalPrompt>,
    settings: InfraSettings,
) -> StageRef {
    Arc::new(InfraStage {
        approval: Some(approval),
        settings,
        ..InfraStage::new(InfraOperation::Apply, executor)
    })
}

/// Destroys every stack in reverse order, after approval.
pub fn infra_destroy(
    executor: Arc<dyn InfraExecutor>,
    approval: Arc<dyn ApprovalPrompt>,
    settings: InfraSettings,
) -> StageRef {
    Arc::new(InfraStage {
        approval: Some(approval),
        settings,
        ..InfraStage::new(InfraOperation::Destroy, executor)
    })
}

/// Stores each stack's outputs under the stack name.
pub fn capture_outputs(executor: Arc<dyn InfraExecutor>) -> StageRef {
    Arc::new(InfraStage::new(InfraOperation::Outputs, executor))
}
