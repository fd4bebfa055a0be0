//! Interfaces to the outside world.
//!
//! The engine never compiles code, runs infrastructure tools, or prompts a
//! human itself. It calls these traits, which callers implement (and tests
//! mock).

mod approval;
mod build;
mod discovery;
mod infra;

pub use approval::{ApprovalPrompt, AutoApprove};
pub use build::{BuildConfig, Builder, BuilderRegistry};
pub use discovery::{StackDiscovery, StaticDiscovery};
pub use infra::{InfraExecutor, PlanVars};

#[cfg(test)]
pub use approval::MockApprovalPrompt;
#[cfg(test)]
pub use build::MockBuilder;
#[cfg(test)]
pub use discovery::MockStackDiscovery;
#[cfg(test)]
pub use infra::MockInfraExecutor;
