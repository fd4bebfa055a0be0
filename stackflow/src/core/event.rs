//! Stage event type for lifecycle and progress reporting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    /// Informational progress.
    Info,
    /// A step finished successfully.
    Success,
    /// Something worth attention that did not fail the run.
    Warning,
    /// A failure.
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// An event emitted while a pipeline runs.
///
/// Events are data: the engine and stages hand them to the context's
/// [`EventSink`](crate::events::EventSink), which decides how to log,
/// collect, or print them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Severity.
    pub level: EventLevel,

    /// The event kind (e.g., "stage.started", "build.completed").
    #[serde(rename = "type")]
    pub kind: String,

    /// Human-readable message.
    pub message: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// Structured payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl StageEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(level: EventLevel, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            kind: kind.into(),
            message: message.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: BTreeMap::new(),
        }
    }

    /// Creates an info event.
    #[must_use]
    pub fn info(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, kind, message)
    }

    /// Creates a success event.
    #[must_use]
    pub fn success(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Success, kind, message)
    }

    /// Creates a warning event.
    #[must_use]
    pub fn warning(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warning, kind, message)
    }

    /// Creates an error event.
    #[must_use]
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, kind, message)
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn started(index: usize, stage_name: &str) -> Self {
        Self::info("stage.started", format!("==> {stage_name}"))
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("index", serde_json::json!(index))
    }

    /// Creates a "stage.completed" event.
    #[must_use]
    pub fn completed(index: usize, stage_name: &str, duration_ms: f64) -> Self {
        Self::success("stage.completed", format!("{stage_name} completed"))
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("index", serde_json::json!(index))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn failed(index: usize, stage_name: &str, error: &str) -> Self {
        Self::error("stage.failed", format!("{stage_name} failed: {error}"))
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("index", serde_json::json!(index))
            .add_data("error", serde_json::json!(error))
    }

    /// Renders the event the way it is shown on a terminal.
    #[must_use]
    pub fn render(&self) -> String {
        match self.level {
            EventLevel::Info => self.message.clone(),
            EventLevel::Success => format!("✓ {}", self.message),
            EventLevel::Warning => format!("⚠ {}", self.message),
            EventLevel::Error => format!("✗ {}", self.message),
        }
    }
}
