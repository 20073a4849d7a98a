//! Batch presentation: generate/vary reports and delete results.

use super::artifacts::{format_artifact_list_json, format_artifact_list_text};
use crate::artifact::Artifact;
use crate::session::BatchReport;
use crate::types::ArtifactId;
use serde_json::json;

fn summary_line(report: &BatchReport) -> String {
    let s = &report.summary;
    let mut line = format!(
        "{} completed, {} failed, {} skipped",
        s.completed, s.failed, s.skipped
    );
    if s.discarded > 0 {
        line.push_str(&format!(", {} discarded", s.discarded));
    }
    line
}

/// `artifacts` are the records this batch created, in creation order.
pub fn format_batch_report_text(report: &BatchReport, artifacts: &[Artifact]) -> String {
    let heading = if report.summary.stopped {
        "Batch stopped"
    } else {
        "Batch finished"
    };
    let mut output = format!("{}: {}\n", heading, summary_line(report));
    if !report.duplicates.is_empty() {
        output.push_str(&format!(
            "Skipped (already active): {}\n",
            report.duplicates.join(", ")
        ));
    }
    if !artifacts.is_empty() {
        output.push('\n');
        output.push_str(&format_artifact_list_text(artifacts));
    }
    output.trim_end().to_string()
}

pub fn format_batch_report_json(report: &BatchReport, artifacts: &[Artifact]) -> String {
    let s = &report.summary;
    let listed: serde_json::Value =
        serde_json::from_str(&format_artifact_list_json(artifacts)).unwrap_or_default();
    let out = json!({
        "stopped": s.stopped,
        "started": s.started,
        "completed": s.completed,
        "failed": s.failed,
        "skipped": s.skipped,
        "discarded": s.discarded,
        "duplicates": report.duplicates,
        "artifacts": listed.get("artifacts").cloned().unwrap_or_default(),
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_deleted(removed: &[ArtifactId]) -> String {
    match removed {
        [] => "Nothing deleted.".to_string(),
        [only] => format!("Deleted artifact {}", only),
        [first, rest @ ..] => format!(
            "Deleted artifact {} and {} derivative(s)",
            first,
            rest.len()
        ),
    }
}
