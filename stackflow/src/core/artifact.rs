//! Build artifact type.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A built artifact, stored in the state keyed by stack name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Location of the artifact on disk.
    pub path: String,
    /// Content checksum (hex SHA-256 by convention of the builders).
    pub checksum: String,
    /// Size in bytes.
    pub size: u64,
}

impl Artifact {
    /// Creates a new artifact.
    #[must_use]
    pub fn new(path: impl Into<String>, checksum: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            checksum: checksum.into(),
            size,
        }
    }

    /// Returns the file name component of the path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path)
    }

    /// Returns the size in mebibytes, for display.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_name() {
        let artifact = Artifact::new(".forge/build/api/lambda.zip", "abc123", 2048);
        assert_eq!(artifact.file_name(), "lambda.zip");
    }

    #[test]
    fn test_artifact_size_mb() {
        let artifact = Artifact::new("bootstrap", "abc123", 3 * 1024 * 1024);
        assert!((artifact.size_mb() - 3.0).abs() < f64::EPSILON);
    }
}
