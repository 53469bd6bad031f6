//! Human-readable rendering of a pipeline status record.

use super::PipelineStatus;
use chrono::SecondsFormat;

/// Formats a status record as log lines.
#[must_use]
pub fn render_logs(status: &PipelineStatus) -> Vec<String> {
    let mut lines = vec![
        format!("Pipeline: {}", status.pipeline_name),
        format!("Status: {}", status.status),
        format!(
            "Start Time: {}",
            status.start_time.to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
    ];

    if let Some(end) = status.end_time {
        lines.push(format!(
            "End Time: {}",
            end.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
    }
    if let Some(duration) = status.duration {
        lines.push(format!("Duration: {duration:?}"));
    }

    lines.push(format!("Steps: {}", status.steps.len()));
    for (name, result) in &status.steps {
        let line = if result.success {
            format!("  {name}: SUCCESS ({:?})", result.duration)
        } else {
            match &result.error {
                Some(error) => format!("  {name}: FAILED ({:?}) - {error}", result.duration),
                None => format!("  {name}: FAILED ({:?})", result.duration),
            }
        };
        lines.push(line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineState, StepResult};
    use std::time::Duration;

    #[test]
    fn test_render_terminal_record() {
        let mut status = PipelineStatus::running("go-ci");
        status.record_step(StepResult::success("build", Duration::from_millis(1500)));
        status.record_step(StepResult::failure(
            "test",
            Duration::from_millis(20),
            "coverage 80.0% below threshold 90%",
        ));
        status.finish(PipelineState::Failed);

        let lines = render_logs(&status);

        assert_eq!(lines[0], "Pipeline: go-ci");
        assert_eq!(lines[1], "Status: failed");
        assert!(lines[2].starts_with("Start Time: "));
        assert!(lines[3].starts_with("End Time: "));
        assert!(lines[4].starts_with("Duration: "));
        assert_eq!(lines[5], "Steps: 2");
        assert_eq!(lines[6], "  build: SUCCESS (1.5s)");
        assert_eq!(
            lines[7],
            "  test: FAILED (20ms) - coverage 80.0% below threshold 90%"
        );
    }

    #[test]
    fn test_render_running_record_omits_end() {
        let lines = render_logs(&PipelineStatus::running("p"));
        assert!(!lines.iter().any(|l| l.starts_with("End Time")));
        assert_eq!(lines.last().map(String::as_str), Some("Steps: 0"));
    }
}
