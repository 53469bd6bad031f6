//! Step results and artifacts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A file produced by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The artifact name.
    pub name: String,
    /// Where the artifact lives.
    pub path: PathBuf,
    /// The artifact type (e.g., "binary", "coverage", "image").
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex-encoded SHA-256 of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Artifact {
    /// Creates an artifact record without reading the file.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        artifact_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            artifact_type: artifact_type.into(),
            size,
            checksum: None,
            description: None,
        }
    }

    /// Creates an artifact from a file on disk, computing size and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_file(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        artifact_type: impl Into<String>,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut file, &mut hasher)?;

        Ok(Self {
            name: name.into(),
            path: path.to_path_buf(),
            artifact_type: artifact_type.into(),
            size,
            checksum: Some(hex::encode(hasher.finalize())),
            description: None,
        })
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The outcome of one step execution inside a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// The step name.
    pub step_name: String,
    /// Whether the step, including its hooks, succeeded.
    pub success: bool,
    /// Wall time spent on the step, hooks included.
    pub duration: Duration,
    /// The failure message; present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Output reported by the handler.
    #[serde(default)]
    pub output: String,
    /// Metadata copied from the step config.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Artifacts reported by the handler.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl StepResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(step_name: impl Into<String>, duration: Duration) -> Self {
        Self {
            step_name: step_name.into(),
            success: true,
            duration,
            error: None,
            output: String::new(),
            metadata: HashMap::new(),
            artifacts: Vec::new(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(
        step_name: impl Into<String>,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            success: false,
            ..Self::success(step_name, duration)
        }
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets output and artifacts.
    #[must_use]
    pub fn with_report(mut self, output: String, artifacts: Vec<Artifact>) -> Self {
        self.output = output;
        self.artifacts = artifacts;
        self
    }
}
