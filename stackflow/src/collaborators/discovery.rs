//! Stack discovery.

use async_trait::async_trait;
use std::path::Path;

use crate::context::Context;
use crate::core::Stack;

/// Finds the stacks of a project.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackDiscovery: Send + Sync {
    /// Returns every stack under `project_dir`.
    async fn discover(&self, ctx: &Context, project_dir: &Path) -> anyhow::Result<Vec<Stack>>;
}

/// Discovery over a fixed list of stacks.
///
/// Each stack's absolute path is resolved against the project directory it
/// is asked about.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    stacks: Vec<Stack>,
}

impl StaticDiscovery {
    /// Creates a discovery returning `stacks`.
    #[must_use]
    pub fn new(stacks: Vec<Stack>) -> Self {
        Self { stacks }
    }
}

#[async_trait]
impl StackDiscovery for StaticDiscovery {
    async fn discover(&self, _ctx: &Context, project_dir: &Path) -> anyhow::Result<Vec<Stack>> {
        Ok(self
            .stacks
            .iter()
            .cloned()
            .map(|stack| stack.rooted_at(project_dir))
            .collect())
    }
}
