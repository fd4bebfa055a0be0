//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::Context;
use crate::core::{Artifact, State};
use crate::errors::{Result, StackflowError};
use crate::stages::Stage;

/// A stage that counts its invocations and passes the state through.
#[derive(Debug)]
pub struct CountingStage {
    name: String,
    calls: AtomicUsize,
}

impl CountingStage {
    /// Creates a new counting stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for CountingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(state)
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    message: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, _state: State) -> Result<State> {
        Err(StackflowError::stage(self.message.clone()))
    }
}

/// A stage that writes one artifact.
#[derive(Debug)]
pub struct ArtifactStage {
    name: String,
    key: String,
}

impl ArtifactStage {
    /// Creates a stage writing an artifact under `key`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl Stage for ArtifactStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        let artifact = Artifact::new(format!("{}/lambda.zip", self.key), "test-checksum", 1024);
        Ok(state.with_artifact(self.key.clone(), artifact))
    }
}

/// A stage that writes one output.
#[derive(Debug)]
pub struct OutputStage {
    name: String,
    key: String,
    value: serde_json::Value,
}

impl OutputStage {
    /// Creates a stage writing `value` under `key`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            value,
        }
    }
}

#[async_trait]
impl Stage for OutputStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        Ok(state.with_output(self.key.clone(), self.value.clone()))
    }
}

/// A stage that waits before passing the state through.
///
/// The wait is abandoned as soon as the context stops.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &Context, state: State) -> Result<State> {
        ctx.guard(tokio::time::sleep(self.delay)).await?;
        Ok(state)
    }
}

/// A stage that works in a loop until its context stops.
///
/// Each iteration does a short unit of work and then checks the context,
/// the way a stage polling an external deployment would.
#[derive(Debug)]
pub struct BusyLoopStage {
    name: String,
    iterations: AtomicUsize,
}

impl BusyLoopStage {
    /// Creates a new busy loop stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            iterations: AtomicUsize::new(0),
        }
    }

    /// Returns how many iterations ran.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for BusyLoopStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &Context, _state: State) -> Result<State> {
        loop {
            ctx.check()?;
            self.iterations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

/// A stage that records every state it receives.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    seen: Mutex<Vec<State>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded states.
    #[must_use]
    pub fn seen(&self) -> Vec<State> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &Context, state: State) -> Result<State> {
        self.seen.lock().push(state.clone());
        Ok(state)
    }
}
