//! Builders and the runtime registry.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::Context;
use crate::core::{Artifact, RuntimeFamily, Stack, SUPPORTED_RUNTIMES};

/// Everything a builder needs to produce one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Directory holding the stack's sources.
    pub source_dir: PathBuf,
    /// Where the artifact is written.
    pub output_path: PathBuf,
    /// Handler path or name.
    pub handler: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Extra environment for the build.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Derives the build inputs for `stack`.
    ///
    /// The artifact lands at `<build_dir>/<stack name>/<build target>`.
    #[must_use]
    pub fn for_stack(stack: &Stack, build_dir: &Path) -> Self {
        Self {
            source_dir: stack.absolute_path.clone(),
            output_path: build_dir.join(&stack.name).join(stack.build_target()),
            handler: stack.handler.clone(),
            runtime: stack.runtime.clone(),
            env: BTreeMap::new(),
        }
    }

    /// Adds environment variables to the build.
    #[must_use]
    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Compiles or packages one stack.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Builder: Send + Sync {
    /// Builds the artifact described by `config`.
    async fn build(&self, ctx: &Context, config: &BuildConfig) -> anyhow::Result<Artifact>;
}

/// Maps runtimes to builders.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: RwLock<BTreeMap<String, Arc<dyn Builder>>>,
}

impl BuilderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `builder` for one runtime, replacing any previous one.
    pub fn register(&self, runtime: impl Into<String>, builder: Arc<dyn Builder>) {
        self.builders.write().insert(runtime.into(), builder);
    }

    /// Registers `builder` for every supported runtime of `family`.
    pub fn register_family(&self, family: RuntimeFamily, builder: Arc<dyn Builder>) {
        let mut builders = self.builders.write();
        for runtime in SUPPORTED_RUNTIMES
            .iter()
            .filter(|rt| RuntimeFamily::of(rt) == family)
        {
            builders.insert((*runtime).to_string(), Arc::clone(&builder));
        }
    }

    /// Looks up the builder for a runtime.
    #[must_use]
    pub fn get(&self, runtime: &str) -> Option<Arc<dyn Builder>> {
        self.builders.read().get(runtime).cloned()
    }

    /// Returns true if a builder is registered for `runtime`.
    #[must_use]
    pub fn supports(&self, runtime: &str) -> bool {
        self.builders.read().contains_key(runtime)
    }

    /// Lists registered runtimes in sorted order.
    #[must_use]
    pub fn runtimes(&self) -> Vec<String> {
        self.builders.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("runtimes", &self.runtimes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stack;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_config_for_python_stack() {
        let stack = stack("api", &[])
            .with_handler("handler.main")
            .rooted_at(Path::new("/project"));
        let config = BuildConfig::for_stack(&stack, Path::new("/project/.forge/build"));

        assert_eq!(config.source_dir, PathBuf::from("/project/api"));
        assert_eq!(
            config.output_path,
            PathBuf::from("/project/.forge/build/api/lambda.zip")
        );
        assert_eq!(config.handler, "handler.main");
        assert_eq!(config.runtime, "python3.12");
    }

    #[test]
    fn test_build_config_for_go_stack() {
        let stack = Stack::new("worker", "worker").with_runtime("provided.al2023");
        let config = BuildConfig::for_stack(&stack, Path::new("build"));
        assert_eq!(config.output_path, PathBuf::from("build/worker/bootstrap"));
    }

    #[test]
    fn test_build_config_env_merges() {
        let env = BTreeMap::from([("GOOS".to_string(), "linux".to_string())]);
        let config = BuildConfig::for_stack(&stack("api", &[]), Path::new("b")).with_env(&env);
        assert_eq!(config.env.get("GOOS").map(String::as_str), Some("linux"));
    }

    #[test]
    fn test_registry_family_registration() {
        let registry = BuilderRegistry::new();
        registry.register_family(RuntimeFamily::Node, Arc::new(MockBuilder::new()));

        assert_eq!(registry.runtimes(), vec!["nodejs18.x", "nodejs20.x"]);
        assert!(registry.supports("nodejs20.x"));
        assert!(!registry.supports("python3.12"));
        assert!(registry.get("java21").is_none());
    }

    #[test]
    fn test_registry_register_replaces() {
        let registry = BuilderRegistry::new();
        let first: Arc<dyn Builder> = Arc::new(MockBuilder::new());
        let second: Arc<dyn Builder> = Arc::new(MockBuilder::new());

        registry.register("go1.x", Arc::clone(&first));
        registry.register("go1.x", Arc::clone(&second));

        let found = registry.get("go1.x").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert_eq!(registry.runtimes().len(), 1);
    }
}
