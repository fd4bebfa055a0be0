//! The per-run context handed to every stage.

use crate::cancellation::CancellationToken;
use crate::core::StageEvent;
use crate::errors::{Result, StackflowError};
use crate::events::{EventSink, NoOpEventSink};
use crate::utils::generate_run_id;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Cancellation, deadline, and event reporting for one pipeline run.
///
/// A context is cheap to clone: clones share the same token, so cancelling
/// one cancels them all. [`Context::child`] creates a context that is
/// cancelled with this one but can also be cancelled on its own.
#[derive(Clone)]
pub struct Context {
    token: Arc<CancellationToken>,
    deadline: Option<Instant>,
    events: Arc<dyn EventSink>,
    run_id: Uuid,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with no deadline and a no-op event sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: Arc::new(CancellationToken::new()),
            deadline: None,
            events: Arc::new(NoOpEventSink),
            run_id: generate_run_id(),
        }
    }

    /// Sets a deadline `timeout` from now. An earlier existing deadline wins.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Sets an absolute deadline. An earlier existing deadline wins.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Requests cancellation of this context and all its children.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns true if the context was cancelled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns an error if the context is no longer live.
    ///
    /// # Errors
    ///
    /// [`StackflowError::Cancelled`] after cancellation,
    /// [`StackflowError::DeadlineExceeded`] after the deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(self.cancellation_error())
        } else {
            Ok(())
        }
    }

    /// Returns the error describing why the context stopped.
    #[must_use]
    pub fn cancellation_error(&self) -> StackflowError {
        if self.token.is_cancelled() {
            StackflowError::Cancelled(
                self.token
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string()),
            )
        } else {
            StackflowError::DeadlineExceeded
        }
    }

    /// Waits until the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Runs a future, abandoning it if the context stops first.
    ///
    /// # Errors
    ///
    /// Returns the cancellation error if the context stops before `fut` completes.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancelled() => Err(self.cancellation_error()),
            output = fut => Ok(output),
        }
    }

    /// Creates a child context sharing the deadline, sink, and run id.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child(),
            deadline: self.deadline,
            events: self.events.clone(),
            run_id: self.run_id,
        }
    }

    /// Emits an event to the sink.
    pub async fn emit(&self, event: StageEvent) {
        self.events.emit(&event).await;
    }

    /// Emits an event without waiting.
    pub fn try_emit(&self, event: StageEvent) {
        self.events.try_emit(&event);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("run_id", &self.run_id)
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
