//! Infrastructure-as-code executor.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use crate::context::Context;

/// Variables passed to a plan, e.g. `namespace = "pr-42-"`.
pub type PlanVars = BTreeMap<String, String>;

/// Runs an infrastructure tool against one working directory.
///
/// Every method targets a stack directory. Implementations should honour
/// `ctx` for long-running commands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InfraExecutor: Send + Sync {
    /// Prepares the working directory.
    async fn init(&self, ctx: &Context, dir: &Path) -> anyhow::Result<()>;

    /// Computes a plan. Returns true if applying it would change anything.
    async fn plan(&self, ctx: &Context, dir: &Path, vars: &PlanVars) -> anyhow::Result<bool>;

    /// Applies the current configuration.
    async fn apply(&self, ctx: &Context, dir: &Path, vars: &PlanVars) -> anyhow::Result<()>;

    /// Tears down everything the directory manages.
    async fn destroy(&self, ctx: &Context, dir: &Path, vars: &PlanVars) -> anyhow::Result<()>;

    /// Reads the outputs of the last apply.
    async fn output(
        &self,
        ctx: &Context,
        dir: &Path,
    ) -> anyhow::Result<serde_json::Map<String, serde_json::Value>>;
}
