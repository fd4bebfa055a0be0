//! Stack type: an independently buildable and deployable unit.

use crate::errors::StackflowError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtimes a stack may declare.
pub const SUPPORTED_RUNTIMES: &[&str] = &[
    "go1.x",
    "provided.al2",
    "provided.al2023",
    "python3.11",
    "python3.12",
    "python3.13",
    "nodejs18.x",
    "nodejs20.x",
    "java11",
    "java17",
    "java21",
];

/// Language family of a runtime, used to pick a builder and build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    /// Go binaries (`go1.x`, `provided.*`).
    Go,
    /// Python packages.
    Python,
    /// Node.js packages.
    Node,
    /// Java archives.
    Java,
    /// Anything else.
    Unknown,
}

impl RuntimeFamily {
    /// Classifies a runtime string.
    #[must_use]
    pub fn of(runtime: &str) -> Self {
        if runtime.starts_with("go") || runtime.starts_with("provided") {
            Self::Go
        } else if runtime.starts_with("python") {
            Self::Python
        } else if runtime.starts_with("nodejs") {
            Self::Node
        } else if runtime.starts_with("java") {
            Self::Java
        } else {
            Self::Unknown
        }
    }
}

/// A deployable unit with optional dependencies on other stacks.
///
/// Dependencies reference other stacks by [`Stack::path`]. A stack listing
/// `after: [b]` depends on `b`, so `b` is ordered first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Unique stack name.
    pub name: String,
    /// Path relative to the project root; the key other stacks depend on.
    pub path: String,
    /// Absolute path of the stack directory.
    pub absolute_path: PathBuf,
    /// Paths of the stacks this one must be deployed after, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Runtime identifier (e.g. `python3.12`).
    #[serde(default)]
    pub runtime: String,
    /// Handler path or name.
    #[serde(default)]
    pub handler: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Stack {
    /// Creates a stack with no dependencies.
    ///
    /// The absolute path and handler default to `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            absolute_path: PathBuf::from(&path),
            handler: path.clone(),
            path,
            dependencies: Vec::new(),
            runtime: String::new(),
            description: None,
        }
    }

    /// Sets the runtime.
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Sets the handler.
    #[must_use]
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    /// Resolves the absolute path against a project root.
    #[must_use]
    pub fn rooted_at(mut self, project_dir: &Path) -> Self {
        self.absolute_path = project_dir.join(&self.path);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a dependency. Repeated paths are ignored.
    #[must_use]
    pub fn with_dependency(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !self.dependencies.contains(&path) {
            self.dependencies.push(path);
        }
        self
    }

    /// Adds several dependencies, keeping the first occurrence of each.
    #[must_use]
    pub fn with_dependencies(self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        paths
            .into_iter()
            .fold(self, |stack, path| stack.with_dependency(path))
    }

    /// Returns the runtime family.
    #[must_use]
    pub fn runtime_family(&self) -> RuntimeFamily {
        RuntimeFamily::of(&self.runtime)
    }

    /// Returns true if the stack has to be compiled or packaged before deploy.
    #[must_use]
    pub fn needs_build(&self) -> bool {
        self.runtime_family() != RuntimeFamily::Unknown
    }

    /// Returns the file name the build produces.
    #[must_use]
    pub fn build_target(&self) -> &'static str {
        match self.runtime_family() {
            RuntimeFamily::Go => "bootstrap",
            _ => "lambda.zip",
        }
    }

    /// Checks that the stack is deployable.
    ///
    /// # Errors
    ///
    /// Returns [`StackflowError::InvalidStack`] if the name or runtime is
    /// missing or the runtime is not supported.
    pub fn validate(&self) -> Result<(), StackflowError> {
        let invalid = |reason: String| StackflowError::InvalidStack {
            stack: if self.name.is_empty() {
                self.path.clone()
            } else {
                self.name.clone()
            },
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("stack name is required".to_string()));
        }
        if self.runtime.is_empty() {
            return Err(invalid("stack runtime is required".to_string()));
        }
        if !SUPPORTED_RUNTIMES.contains(&self.runtime.as_str()) {
            return Err(invalid(format!("unsupported runtime: {}", self.runtime)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_defaults() {
        let stack = Stack::new("api", "services/api");
        assert_eq!(stack.handler, "services/api");
        assert_eq!(stack.absolute_path, PathBuf::from("services/api"));
        assert!(stack.dependencies.is_empty());
    }

    #[test]
    fn test_dependencies_are_an_ordered_set() {
        let stack = Stack::new("api", "api").with_dependencies(["db", "queue", "db"]);
        assert_eq!(stack.dependencies, vec!["db".to_string(), "queue".to_string()]);
    }

    #[test]
    fn test_rooted_at() {
        let stack = Stack::new("api", "services/api").rooted_at(Path::new("/project"));
        assert_eq!(stack.absolute_path, PathBuf::from("/project/services/api"));
    }

    #[test]
    fn test_build_target_by_runtime() {
        assert_eq!(Stack::new("a", "a").with_runtime("go1.x").build_target(), "bootstrap");
        assert_eq!(
            Stack::new("a", "a").with_runtime("provided.al2023").build_target(),
            "bootstrap"
        );
        assert_eq!(
            Stack::new("a", "a").with_runtime("python3.12").build_target(),
            "lambda.zip"
        );
    }

    #[test]
    fn test_needs_build() {
        assert!(Stack::new("a", "a").with_runtime("nodejs20.x").needs_build());
        assert!(Stack::new("a", "a").with_runtime("java21").needs_build());
        assert!(!Stack::new("a", "a").with_runtime("static").needs_build());
    }

    #[test]
    fn test_validate() {
        assert!(Stack::new("api", "api").with_runtime("python3.12").validate().is_ok());

        let err = Stack::new("", "api").with_runtime("python3.12").validate().unwrap_err();
        assert!(err.to_string().contains("name is required"));

        let err = Stack::new("api", "api").validate().unwrap_err();
        assert!(err.to_string().contains("runtime is required"));

        let err = Stack::new("api", "api").with_runtime("cobol").validate().unwrap_err();
        assert!(err.to_string().contains("unsupported runtime: cobol"));
    }

    #[test]
    fn test_stack_serialization() {
        let stack = Stack::new("api", "api").with_runtime("go1.x").with_dependency("db");
        let json = serde_json::to_string(&stack).unwrap();
        let back: Stack = serde_json::from_str(&json).unwrap();
        assert_eq!(stack, back);
    }
}
