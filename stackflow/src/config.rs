//! Engine configuration.

use crate::errors::{Result, StackflowError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a deploy or destroy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Project root.
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    /// Where build artifacts go. Relative paths resolve against `project_dir`.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Skip the approval prompt before apply.
    #[serde(default)]
    pub auto_approve: bool,
    /// Namespace for ephemeral environments (e.g. a PR number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Build independent stacks concurrently.
    #[serde(default = "default_parallel_builds")]
    pub parallel_builds: bool,
    /// Deadline for a whole run, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_seconds: Option<f64>,
    /// Extra environment passed to every build.
    #[serde(default)]
    pub build_env: BTreeMap<String, String>,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(".forge/build")
}

fn default_parallel_builds() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            build_dir: default_build_dir(),
            auto_approve: false,
            namespace: None,
            parallel_builds: default_parallel_builds(),
            stage_timeout_seconds: None,
            build_env: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults for a project.
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// A relative `project_dir` in the file resolves against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_json_str(&contents)?;

        if config.project_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.project_dir = parent.join(&config.project_dir);
            }
        }

        tracing::debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if let Some(seconds) = self.stage_timeout_seconds {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(StackflowError::Config(format!(
                    "stage_timeout_seconds must be a positive number, got {seconds}"
                )));
            }
        }
        if let Some(namespace) = &self.namespace {
            if namespace.trim().is_empty() {
                return Err(StackflowError::Config(
                    "namespace must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Sets the build directory.
    #[must_use]
    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = dir.into();
        self
    }

    /// Sets auto-approve.
    #[must_use]
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Enables or disables concurrent builds.
    #[must_use]
    pub fn with_parallel_builds(mut self, parallel: bool) -> Self {
        self.parallel_builds = parallel;
        self
    }

    /// Sets the run deadline.
    #[must_use]
    pub fn with_stage_timeout(mut self, seconds: f64) -> Self {
        self.stage_timeout_seconds = Some(seconds);
        self
    }

    /// Adds a build environment variable.
    #[must_use]
    pub fn with_build_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_env.insert(key.into(), value.into());
        self
    }

    /// Returns the build directory resolved against the project root.
    #[must_use]
    pub fn resolved_build_dir(&self) -> PathBuf {
        self.project_dir.join(&self.build_dir)
    }

    /// Returns the run deadline as a duration.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_seconds.map(Duration::from_secs_f64)
    }

    /// Returns the resource name prefix for the namespace (`"pr-42-"`).
    #[must_use]
    pub fn namespace_prefix(&self) -> Option<String> {
        self.namespace.as_ref().map(|ns| format!("{ns}-"))
    }

    /// Serializes the config for [`State::config`](crate::core::State::config).
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"info,stackflow=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}
