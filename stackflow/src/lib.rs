//! # Stackflow
//!
//! Dependency-ordered deployment of independent stacks, driven by composable
//! stage pipelines.
//!
//! Stackflow provides:
//!
//! - **Dependency graph**: validation (missing dependencies, duplicate paths,
//!   cycles with their full path), deterministic topological order and
//!   parallel levels
//! - **Stage pipelines**: short-circuiting sequential runs, flat chaining, and
//!   a truly concurrent `parallel` combinator with merge-conflict detection
//! - **Run context**: cancellation, deadlines and an event sink threaded
//!   through every stage
//! - **Deploy stages**: discovery, builds and infrastructure operations over
//!   injected collaborators
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stackflow::prelude::*;
//!
//! let graph = DependencyGraph::new(stacks)?;
//! let waves = graph.parallel_levels()?;
//!
//! let pipeline = Pipeline::chain([
//!     Pipeline::new([detect_stacks(discovery), sort_by_dependencies()]),
//!     Pipeline::new([build_all(registry, BuildSettings::new(".forge/build"))]),
//! ]);
//! let state = pipeline.run(&Context::new(), State::new(".")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod core;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod graph;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

pub use errors::{Result, StackflowError};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::collaborators::{
        ApprovalPrompt, AutoApprove, BuildConfig, Builder, BuilderRegistry, InfraExecutor,
        PlanVars, StackDiscovery, StaticDiscovery,
    };
    pub use crate::config::{EngineConfig, LogFormat, LoggingConfig};
    pub use crate::context::Context;
    pub use crate::core::{
        Artifact, EventLevel, RuntimeFamily, Stack, StageEvent, State, SUPPORTED_RUNTIMES,
    };
    pub use crate::deploy::{deploy, deploy_pipeline, destroy, destroy_pipeline, Collaborators};
    pub use crate::errors::{
        CycleDetectedError, GraphValidationError, MergeConflictError, MergeKind, Result,
        StackflowError,
    };
    pub use crate::events::{
        ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::graph::DependencyGraph;
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{parallel, sequential, Pipeline, RunReport};
    pub use crate::stages::build::{build_all, build_stack, BuildSettings};
    pub use crate::stages::infra::{
        capture_outputs, infra_apply, infra_destroy, infra_init, infra_plan, InfraSettings,
    };
    pub use crate::stages::stacks::{
        detect_stacks, filter_by_runtime, filter_stacks, map_stacks, reverse_stacks,
        sort_by_dependencies, validate_stacks,
    };
    pub use crate::stages::{stage_fn, FnStage, NoOpStage, Stage, StageRef};
}
