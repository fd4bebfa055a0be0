//! Human approval before changing infrastructure.

use async_trait::async_trait;

use crate::context::Context;
use crate::core::Stack;

/// Asks whether an operation over `stacks` may proceed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    /// Returns true to proceed. `action` is e.g. `"apply"` or `"destroy"`.
    async fn approve(&self, ctx: &Context, action: &str, stacks: &[Stack]) -> anyhow::Result<bool>;
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalPrompt for AutoApprove {
    async fn approve(&self, _ctx: &Context, _action: &str, _stacks: &[Stack]) -> anyhow::Result<bool> {
        Ok(true)
    }
}
