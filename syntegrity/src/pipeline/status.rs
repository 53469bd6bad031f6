//! The per-pipeline status record.

use crate::core::{PipelineState, StepResult};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The in-memory state of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    /// The pipeline name.
    pub pipeline_name: String,
    /// Current state.
    pub status: PipelineState,
    /// When execution started.
    pub start_time: DateTime<Utc>,
    /// When the record left `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// `end_time - start_time`, set together with `end_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// Results of attempted steps in attempt order.
    #[serde(default)]
    pub steps: IndexMap<String, StepResult>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PipelineStatus {
    /// Creates a `running` record starting now.
    #[must_use]
    pub fn running(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            status: PipelineState::Running,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            steps: IndexMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Moves a running record into `state` and stamps the end time.
    ///
    /// Terminal records are left untouched; returns whether the transition
    /// happened.
    pub fn finish(&mut self, state: PipelineState) -> bool {
        if self.status.is_terminal() || !state.is_terminal() {
            return false;
        }
        let end = Utc::now().max(self.start_time);
        self.status = state;
        self.end_time = Some(end);
        self.duration = Some((end - self.start_time).to_std().unwrap_or_default());
        true
    }

    /// Stores a step result, replacing any earlier result for that step.
    pub fn record_step(&mut self, result: StepResult) {
        self.steps.insert(result.step_name.clone(), result);
    }

    /// Returns the duration once the record is terminal.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns true once the record has left `running`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Number of recorded steps that failed.
    #[must_use]
    pub fn failed_step_count(&self) -> usize {
        self.steps.values().filter(|r| !r.success).count()
    }
}
