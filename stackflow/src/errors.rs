//! Error types for stackflow.
//!
//! Three families of failure reach callers:
//! - [`GraphValidationError`]: the stack collection cannot be ordered
//!   (missing dependency, duplicate path, cycle).
//! - Stage failures, wrapped by the runner in [`StackflowError::StageFailed`]
//!   with the stage index and name.
//! - [`MergeConflictError`]: two parallel branches wrote the same key.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T, E = StackflowError> = std::result::Result<T, E>;

/// The main error type for stackflow operations.
#[derive(Debug, Error)]
pub enum StackflowError {
    /// The dependency graph could not be built.
    #[error("{0}")]
    Graph(#[from] GraphValidationError),

    /// A stage in a pipeline failed.
    #[error("stage {index} ('{stage}') failed: {source}")]
    StageFailed {
        /// Position of the stage in its pipeline.
        index: usize,
        /// Name of the failing stage.
        stage: String,
        /// The underlying error.
        #[source]
        source: Box<StackflowError>,
    },

    /// Two parallel branches wrote the same key.
    #[error("{0}")]
    MergeConflict(#[from] MergeConflictError),

    /// A plain stage-level failure.
    #[error("Stage execution error: {0}")]
    Stage(String),

    /// An injected collaborator (builder, executor, discovery) failed.
    #[error("{operation} failed for {target}: {source}")]
    Collaborator {
        /// The operation being performed (e.g. "build", "apply").
        operation: String,
        /// The stack or directory the operation targeted.
        target: String,
        /// The collaborator's error.
        #[source]
        source: anyhow::Error,
    },

    /// A single stack failed validation.
    #[error("invalid stack '{stack}': {reason}")]
    InvalidStack {
        /// The stack name.
        stack: String,
        /// Why the stack is invalid.
        reason: String,
    },

    /// One or more stacks failed validation.
    #[error("stack validation failed: {}", .0.join("; "))]
    StackValidation(Vec<String>),

    /// The run context was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// The run context deadline passed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StackflowError {
    /// Creates a plain stage error.
    #[must_use]
    pub fn stage(message: impl Into<String>) -> Self {
        Self::Stage(message.into())
    }

    /// Wraps a collaborator failure with the operation and target it concerned.
    #[must_use]
    pub fn collaborator(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Collaborator {
            operation: operation.into(),
            target: target.into(),
            source,
        }
    }

    /// Wraps an error with the position of the stage that produced it.
    #[must_use]
    pub fn at_stage(self, index: usize, stage: impl Into<String>) -> Self {
        Self::StageFailed {
            index,
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, peeling every `StageFailed` wrapper.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the `(index, stage)` chain from the outermost wrapper inwards.
    #[must_use]
    pub fn stage_trail(&self) -> Vec<(usize, &str)> {
        let mut trail = Vec::new();
        let mut current = self;
        while let Self::StageFailed {
            index,
            stage,
            source,
        } = current
        {
            trail.push((*index, stage.as_str()));
            current = source.as_ref();
        }
        trail
    }

    /// Returns true if the root cause is a cancellation or an expired deadline.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Cancelled(_) | Self::DeadlineExceeded
        )
    }

    /// Returns the merge conflict at the root of this error, if any.
    #[must_use]
    pub fn as_merge_conflict(&self) -> Option<&MergeConflictError> {
        match self.root_cause() {
            Self::MergeConflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    /// Returns the graph validation error at the root of this error, if any.
    #[must_use]
    pub fn as_graph_error(&self) -> Option<&GraphValidationError> {
        match self.root_cause() {
            Self::Graph(err) => Some(err),
            _ => None,
        }
    }

    /// Converts to the structured form surfaced to users.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        let trail = self.stage_trail();
        if !trail.is_empty() {
            let stages: Vec<serde_json::Value> = trail
                .iter()
                .map(|(index, stage)| serde_json::json!({ "index": index, "stage": stage }))
                .collect();
            map.insert("stages".to_string(), serde_json::Value::Array(stages));
        }

        match self.root_cause() {
            Self::Graph(err) => {
                map.insert("error_info".to_string(), serde_json::json!(err.error_info()));
                if let GraphValidationError::Cycle(cycle) = err {
                    map.insert("cycle_path".to_string(), serde_json::json!(cycle.cycle_path));
                }
            }
            Self::MergeConflict(conflict) => {
                map.insert("error_info".to_string(), serde_json::json!(conflict.error_info()));
            }
            _ => {}
        }

        serde_json::Value::Object(map)
    }
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "GRAPH-002-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stack collection cannot form a valid dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphValidationError {
    /// A stack depends on a path no stack in the collection has.
    #[error("stack '{stack}' depends on non-existent stack '{missing}'")]
    MissingDependency {
        /// The stack declaring the dependency.
        stack: String,
        /// The path that could not be found.
        missing: String,
    },

    /// Two stacks share the same path.
    #[error("duplicate stack path '{path}' declared by '{first}' and '{second}'")]
    DuplicateStack {
        /// The shared path.
        path: String,
        /// The first stack declaring it.
        first: String,
        /// The second stack declaring it.
        second: String,
    },

    /// The dependencies form a cycle.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),
}

impl GraphValidationError {
    /// Returns the diagnostic info for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        match self {
            Self::MissingDependency { stack, missing } => ErrorInfo::new(
                "GRAPH-001-MISSING_DEP",
                format!("Dependency '{missing}' not found"),
            )
            .with_fix_hint("Check the 'after' entries of the stack for typos or a removed stack.")
            .with_context_entry("stack", stack)
            .with_context_entry("missing", missing),
            Self::DuplicateStack { path, first, second } => ErrorInfo::new(
                "GRAPH-003-DUPLICATE",
                format!("Path '{path}' is declared by more than one stack"),
            )
            .with_fix_hint("Give every stack its own directory.")
            .with_context_entry("first", first)
            .with_context_entry("second", second),
            Self::Cycle(cycle) => cycle.error_info.clone(),
        }
    }

    /// Returns the cycle path if this is a cycle error.
    #[must_use]
    pub fn cycle_path(&self) -> Option<&[String]> {
        match self {
            Self::Cycle(cycle) => Some(&cycle.cycle_path),
            _ => None,
        }
    }
}

/// Error raised when a cycle is detected among stack dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circular dependency detected: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The stacks forming the cycle; the first entry is repeated at the end.
    pub cycle_path: Vec<String>,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ErrorInfo::new(
            "GRAPH-002-CYCLE",
            format!("Stacks contain a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the 'after' entries in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }

    /// Returns true if the named stack takes part in the cycle.
    #[must_use]
    pub fn contains(&self, stack: &str) -> bool {
        self.cycle_path.iter().any(|s| s == stack)
    }
}

/// Which state map a merge conflict occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeKind {
    /// The artifacts map.
    Artifact,
    /// The outputs map.
    Output,
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artifact => write!(f, "artifact"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Error raised when two concurrent branches write the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("merge conflict: {kind} '{key}' written by both '{first_branch}' and '{second_branch}'")]
pub struct MergeConflictError {
    /// The map the key lives in.
    pub kind: MergeKind,
    /// The conflicting key.
    pub key: String,
    /// The branch that wrote the key first (in declaration order).
    pub first_branch: String,
    /// The branch that wrote it again.
    pub second_branch: String,
}

impl MergeConflictError {
    /// Creates a new merge conflict error.
    #[must_use]
    pub fn new(
        kind: MergeKind,
        key: impl Into<String>,
        first_branch: impl Into<String>,
        second_branch: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            first_branch: first_branch.into(),
            second_branch: second_branch.into(),
        }
    }

    /// Returns the diagnostic info for this conflict.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new(
            "PIPELINE-001-MERGE_CONFLICT",
            format!("Parallel stages both wrote {} '{}'", self.kind, self.key),
        )
        .with_fix_hint("Give each parallel stage its own artifact and output keys.")
        .with_context_entry("first_branch", &self.first_branch)
        .with_context_entry("second_branch", &self.second_branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_creation() {
        let info = ErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stack", "api");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stack"), Some(&"api".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> c -> a"));
        assert_eq!(err.error_info.code, "GRAPH-002-CYCLE");
        assert!(err.contains("b"));
        assert!(!err.contains("d"));
    }

    #[test]
    fn test_missing_dependency_message_names_both_sides() {
        let err = GraphValidationError::MissingDependency {
            stack: "api".to_string(),
            missing: "services/db".to_string(),
        };

        let message = err.to_string();
        assert!(message.contains("api"));
        assert!(message.contains("services/db"));
        assert_eq!(err.error_info().code, "GRAPH-001-MISSING_DEP");
        assert!(err.cycle_path().is_none());
    }

    #[test]
    fn test_root_cause_peels_stage_wrappers() {
        let conflict = MergeConflictError::new(MergeKind::Artifact, "api", "build:api", "build:api-copy");
        let err = StackflowError::from(conflict.clone())
            .at_stage(1, "build-wave")
            .at_stage(3, "build-all");

        assert_eq!(err.as_merge_conflict(), Some(&conflict));
        assert_eq!(err.stage_trail(), vec![(3, "build-all"), (1, "build-wave")]);
        assert!(err.to_string().contains("build-all"));
    }

    #[test]
    fn test_is_cancellation() {
        assert!(StackflowError::Cancelled("stop".into()).at_stage(0, "s").is_cancellation());
        assert!(StackflowError::DeadlineExceeded.is_cancellation());
        assert!(!StackflowError::stage("boom").is_cancellation());
    }

    #[test]
    fn test_to_dict_reports_cycle_path() {
        let err: StackflowError = GraphValidationError::from(CycleDetectedError::new(vec![
            "a".into(),
            "b".into(),
            "a".into(),
        ]))
        .into();

        let dict = err.to_dict();
        assert_eq!(dict["cycle_path"], serde_json::json!(["a", "b", "a"]));
        assert_eq!(dict["error_info"]["code"], "GRAPH-002-CYCLE");
    }

    #[test]
    fn test_collaborator_error_keeps_source() {
        let err = StackflowError::collaborator("apply", "api", anyhow::anyhow!("exit status 1"));
        assert_eq!(err.to_string(), "apply failed for api: exit status 1");
        assert!(std::error::Error::source(&err).is_some());
    }
}
