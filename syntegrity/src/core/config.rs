//! Step configuration declared by handlers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The configuration a handler declares for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// The unique step name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Whether the step is required for the pipeline.
    #[serde(default)]
    pub required: bool,
    /// Advisory: the step could run alongside independent steps.
    #[serde(default)]
    pub parallel: bool,
    /// Deadline covering every attempt of the step; zero means unbounded.
    #[serde(default)]
    pub timeout: Duration,
    /// Additional attempts after the first failure.
    #[serde(default)]
    pub retries: u32,
    /// Steps that must run before this one, in declaration order.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Semantic tags consulted by callers.
    #[serde(default)]
    pub conditions: HashMap<String, String>,
    /// Free-form metadata copied into step results.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StepConfig {
    /// Creates a config with defaults: optional, sequential, unbounded, no retries.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required: false,
            parallel: false,
            timeout: Duration::ZERO,
            retries: 0,
            depends_on: Vec::new(),
            conditions: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Marks the step as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the step as parallelizable.
    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Sets the step timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Adds dependencies, skipping names already present.
    #[must_use]
    pub fn depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for dep in deps {
            let dep = dep.into();
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Adds metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Total attempts allowed: retries plus the first attempt.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Returns the timeout if one is set.
    #[must_use]
    pub fn effective_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}
