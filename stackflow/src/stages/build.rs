//! Artifact builds.
//!
//! [`build_all`] builds every stack that needs it, one dependency level at a
//! time. Stacks within a level are independent, so a level runs through
//! [`parallel`] unless parallel builds are turned off, in which case every
//! stack builds in topological order.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Stage, StageRef};
use crate::collaborators::{BuildConfig, BuilderRegistry};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::core::{Stack, StageEvent, State};
use crate::errors::{Result, StackflowError};
use crate::graph::DependencyGraph;
use crate::pipeline::{ParallelStage, Pipeline};

/// Where and how builds run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    /// Root directory for artifacts.
    pub build_dir: PathBuf,
    /// Environment passed to every build.
    pub env: BTreeMap<String, String>,
    /// Build independent stacks concurrently.
    pub parallel: bool,
}

impl BuildSettings {
    /// Parallel builds into `build_dir` with no extra environment.
    #[must_use]
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            env: BTreeMap::new(),
            parallel: true,
        }
    }

    /// Takes the build directory, environment and parallelism from `config`.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            build_dir: config.resolved_build_dir(),
            env: config.build_env.clone(),
            parallel: config.parallel_builds,
        }
    }

    /// Adds a build environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Builds one stack at a time.
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Builds one stack and records its artifact under the stack name.
pub struct BuildStack {
    name: String,
    stack: Stack,
    registry: Arc<BuilderRegistry>,
    settings: BuildSettings,
}

impl Debug for BuildStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildStack")
            .field("stack", &self.stack.name)
            .field("runtime", &self.stack.runtime)
            .finish()
    }
}

#[async_trait]
impl Stage for BuildStack {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        let stack = &self.stack;
        let builder = self
            .registry
            .get(&stack.runtime)
            .ok_or_else(|| StackflowError::InvalidStack {
                stack: stack.name.clone(),
                reason: format!("unsupported runtime: {}", stack.runtime),
            })?;

        let config =
            BuildConfig::for_stack(stack, &self.settings.build_dir).with_env(&self.settings.env);
        ctx.emit(StageEvent::info(
            "build.started",
            format!("[{}] Building...", stack.name),
        ))
        .await;

        let artifact = match ctx.guard(builder.build(ctx, &config)).await? {
            Ok(artifact) => artifact,
            Err(e) => {
                ctx.emit(StageEvent::error(
                    "build.failed",
                    format!("Failed to build {}", stack.name),
                ))
                .await;
                return Err(StackflowError::collaborator("build", &stack.name, e));
            }
        };

        debug!(stack = %stack.name, path = %artifact.path, size = artifact.size, "Built artifact");
        ctx.emit(
            StageEvent::success(
                "build.completed",
                format!("[{}] Built ({:.2} MB)", stack.name, artifact.size_mb()),
            )
            .add_data("path", artifact.path.clone().into()),
        )
        .await;

        Ok(state.with_artifact(stack.name.clone(), artifact))
    }
}

/// Builds `stack` with the builder registered for its runtime.
///
/// A runtime with no registered builder fails with
/// [`StackflowError::InvalidStack`] naming the runtime.
pub fn build_stack(registry: Arc<BuilderRegistry>, stack: Stack, settings: &BuildSettings) -> StageRef {
    Arc::new(BuildStack {
        name: format!("build:{}", stack.name),
        stack,
        registry,
        settings: settings.clone(),
    })
}

/// Builds every stack in the state that needs a build.
pub struct BuildAll {
    registry: Arc<BuilderRegistry>,
    settings: BuildSettings,
}

impl Debug for BuildAll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildAll")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}

impl BuildAll {
    fn stage_for(&self, stack: &Stack) -> StageRef {
        build_stack(Arc::clone(&self.registry), stack.clone(), &self.settings)
    }

    fn plan(&self, graph: &DependencyGraph) -> Result<Pipeline> {
        if !self.settings.parallel {
            let sorted = graph.topological_sort()?;
            return Ok(sorted
                .iter()
                .filter(|stack| stack.needs_build())
                .map(|stack| self.stage_for(stack))
                .collect());
        }

        let mut waves = Vec::new();
        for stacks in graph.parallel_levels()? {
            let mut stages: Vec<StageRef> = stacks
                .iter()
                .filter(|stack| stack.needs_build())
                .map(|stack| self.stage_for(stack))
                .collect();
            let wave: StageRef = match stages.len() {
                0 => continue,
                1 => stages.remove(0),
                _ => Arc::new(ParallelStage::new(stages).named(format!("build wave {}", waves.len()))),
            };
            waves.push(wave);
        }
        Ok(Pipeline::new(waves))
    }
}

#[async_trait]
impl Stage for BuildAll {
    fn name(&self) -> &str {
        "build_all"
    }

    async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        let graph = DependencyGraph::new(state.stacks().iter().cloned())?;

        for stack in graph.stacks().iter().filter(|s| !s.needs_build()) {
            ctx.emit(StageEvent::warning(
                "build.skipped",
                format!("[{}] No build step for runtime '{}'", stack.name, stack.runtime),
            ))
            .await;
        }

        let plan = self.plan(&graph)?;
        info!(
            steps = plan.len(),
            parallel = self.settings.parallel,
            "Building stacks"
        );
        plan.run(ctx, state).await
    }
}

/// Builds every stack, dependencies first.
pub fn build_all(registry: Arc<BuilderRegistry>, settings: BuildSettings) -> StageRef {
    Arc::new(BuildAll { registry, settings })
}
