//! Named pipelines and run-time narrowing of their step lists.

use crate::errors::{EngineError, EngineResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named, ordered bundle of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// The pipeline name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Steps in execution order.
    pub steps: Vec<String>,
}

impl PipelineDefinition {
    /// Creates a definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }
}

/// Flags that narrow which steps of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Drop `push` and `release`.
    pub skip_push: bool,
    /// Run only `setup` and `build`.
    pub only_build: bool,
    /// Run only `setup`, `build` and `test`.
    pub only_test: bool,
    /// Run a single step instead of a pipeline.
    pub step: Option<String>,
}

const KIT_STEPS: [&str; 8] = [
    "setup", "build", "test", "lint", "security", "tag", "package", "push",
];
const CI_STEPS: [&str; 5] = ["setup", "build", "test", "lint", "security"];
const BUILD_ONLY: [&str; 2] = ["setup", "build"];
const TEST_ONLY: [&str; 3] = ["setup", "build", "test"];
const PUSH_STEPS: [&str; 2] = ["push", "release"];

/// The set of pipelines a user can select by name.
#[derive(Debug, Clone, Default)]
pub struct PipelineCatalog {
    pipelines: IndexMap<String, PipelineDefinition>,
}

impl PipelineCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the catalog of built-in Go pipelines.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.add(PipelineDefinition::new(
            "go-kit",
            "Build, verify, package and push a Go service",
            KIT_STEPS,
        ));
        catalog.add(PipelineDefinition::new(
            "go-ci",
            "Build and verify a Go module without publishing",
            CI_STEPS,
        ));
        catalog.add(PipelineDefinition::new(
            "go-release",
            "The go-kit flow followed by a release",
            KIT_STEPS.into_iter().chain(["release"]),
        ));
        catalog
    }

    /// Adds or replaces a pipeline.
    pub fn add(&mut self, definition: PipelineDefinition) {
        self.pipelines.insert(definition.name.clone(), definition);
    }

    /// Returns a pipeline by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown name.
    pub fn get(&self, name: &str) -> EngineResult<&PipelineDefinition> {
        self.pipelines
            .get(name)
            .ok_or_else(|| EngineError::PipelineNotFound(name.to_string()))
    }

    /// Lists pipelines in insertion order.
    pub fn list(&self) -> impl Iterator<Item = &PipelineDefinition> {
        self.pipelines.values()
    }

    /// Resolves the steps to run for `name`.
    ///
    /// A non-empty `configured` list replaces the catalog list and is used
    /// as given. Catalog lists drop steps absent from `registered`, which
    /// is how disabled optional steps fall out. `only_build` and `only_test`
    /// replace the list; `skip_push` then drops `push` and `release`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown pipeline name.
    pub fn resolve(
        &self,
        name: &str,
        configured: &[String],
        registered: &[String],
        options: &RunOptions,
    ) -> EngineResult<Vec<String>> {
        let definition = self.get(name)?;

        let mut steps: Vec<String> = if options.only_build {
            BUILD_ONLY.iter().map(ToString::to_string).collect()
        } else if options.only_test {
            TEST_ONLY.iter().map(ToString::to_string).collect()
        } else if !configured.is_empty() {
            configured.to_vec()
        } else {
            definition
                .steps
                .iter()
                .filter(|step| registered.contains(step))
                .cloned()
                .collect()
        };

        if options.skip_push {
            steps.retain(|step| !PUSH_STEPS.contains(&step.as_str()));
        }
        Ok(steps)
    }
}
