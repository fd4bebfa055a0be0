//! The state value threaded through every stage.

use super::{Artifact, Stack};
use crate::errors::{Result, StackflowError};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// State carried through a pipeline.
///
/// `State` is a value: every `with_*` method returns a new state and leaves
/// clones untouched. The collections are shared behind `Arc` and copied on
/// first write ([`Arc::make_mut`]), so cloning a state for a parallel branch is
/// cheap and a branch can never observe another branch's writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    project_dir: PathBuf,
    stacks: Arc<Vec<Stack>>,
    artifacts: Arc<BTreeMap<String, Artifact>>,
    outputs: Arc<BTreeMap<String, serde_json::Value>>,
    config: Arc<serde_json::Value>,
}

impl State {
    /// Creates an empty state rooted at a project directory.
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    /// Returns the project root.
    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Returns the ordered stack list.
    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Returns all artifacts keyed by stack name.
    #[must_use]
    pub fn artifacts(&self) -> &BTreeMap<String, Artifact> {
        &self.artifacts
    }

    /// Returns the artifact for a stack.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// Returns all outputs.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.outputs
    }

    /// Returns a single output.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&serde_json::Value> {
        self.outputs.get(key)
    }

    /// Returns the opaque configuration.
    #[must_use]
    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Deserializes the opaque configuration into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns a config error if the stored value does not match `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.config.as_ref().clone())
            .map_err(|e| StackflowError::Config(format!("state config does not match: {e}")))
    }

    /// Replaces the stack list.
    #[must_use]
    pub fn with_stacks(mut self, stacks: Vec<Stack>) -> Self {
        self.stacks = Arc::new(stacks);
        self
    }

    /// Adds or replaces an artifact.
    #[must_use]
    pub fn with_artifact(mut self, name: impl Into<String>, artifact: Artifact) -> Self {
        Arc::make_mut(&mut self.artifacts).insert(name.into(), artifact);
        self
    }

    /// Adds or replaces an output.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        Arc::make_mut(&mut self.outputs).insert(key.into(), value);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Returns true if both states share every collection without copying.
    ///
    /// Two states that compare equal may still hold separate copies; this
    /// checks that no copy-on-write happened between them.
    #[must_use]
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        self.project_dir == other.project_dir
            && Arc::ptr_eq(&self.stacks, &other.stacks)
            && Arc::ptr_eq(&self.artifacts, &other.artifacts)
            && Arc::ptr_eq(&self.outputs, &other.outputs)
            && Arc::ptr_eq(&self.config, &other.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = State::new("/project");
        assert_eq!(state.project_dir(), Path::new("/project"));
        assert!(state.stacks().is_empty());
        assert!(state.artifacts().is_empty());
        assert!(state.outputs().is_empty());
        assert!(state.config().is_null());
    }

    #[test]
    fn test_with_artifact_does_not_touch_clones() {
        let original = State::new("/project");
        let snapshot = original.clone();

        let updated = original.with_artifact("api", Artifact::new("api.zip", "abc", 10));

        assert!(snapshot.artifacts().is_empty());
        assert_eq!(updated.artifact("api").unwrap().path, "api.zip");
    }

    #[test]
    fn test_clone_shares_storage_until_written() {
        let state = State::new("/project").with_output("region", serde_json::json!("eu-west-1"));
        let clone = state.clone();
        assert!(state.shares_storage_with(&clone));

        let written = clone.with_output("stage", serde_json::json!("dev"));
        assert!(!state.shares_storage_with(&written));
        assert_eq!(state.outputs().len(), 1);
        assert_eq!(written.outputs().len(), 2);
    }

    #[test]
    fn test_config_as() {
        #[derive(serde::Deserialize)]
        struct Settings {
            namespace: String,
        }

        let state = State::new("/p").with_config(serde_json::json!({"namespace": "dev"}));
        let settings: Settings = state.config_as().unwrap();
        assert_eq!(settings.namespace, "dev");

        let state = State::new("/p").with_config(serde_json::json!(42));
        assert!(state.config_as::<Settings>().is_err());
    }
}
