//! Artifact presentation: list and detail text/json.

use crate::artifact::{Approval, Artifact, ArtifactKind, ArtifactStatus};
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

/// Millisecond epoch timestamp as `YYYY-MM-DD HH:MM:SS` UTC.
pub fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn status_cell(status: ArtifactStatus) -> String {
    match status {
        ArtifactStatus::Pending => format!("{}", status.as_str().dimmed()),
        ArtifactStatus::Generating => format!("{}", status.as_str().yellow()),
        ArtifactStatus::Completed => format!("{}", status.as_str().green()),
        ArtifactStatus::Failed => format!("{}", status.as_str().red()),
    }
}

fn approval_cell(approval: Approval) -> String {
    match approval {
        Approval::Waiting => "-".to_string(),
        Approval::Approved => format!("{}", approval.as_str().green()),
        Approval::Rejected => format!("{}", approval.as_str().red()),
    }
}

fn kind_str(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Primary => "primary",
        ArtifactKind::Derivative => "derivative",
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

pub fn format_artifact_list_text(artifacts: &[Artifact]) -> String {
    if artifacts.is_empty() {
        return "No artifacts found.\n\nUse 'easel generate --manifest <file>' to start a batch."
            .to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Id", "Key", "Kind", "Status", "Approval", "Attempts", "Updated", "Detail",
    ]);
    for artifact in artifacts {
        let detail = match artifact.status {
            ArtifactStatus::Completed => artifact
                .payload
                .as_ref()
                .map(|p| p.describe())
                .unwrap_or_default(),
            ArtifactStatus::Failed => artifact.error_detail.clone().unwrap_or_default(),
            _ => String::new(),
        };
        table.add_row(vec![
            artifact.id.short(),
            artifact.request_key.clone(),
            kind_str(artifact.kind).to_string(),
            status_cell(artifact.status),
            approval_cell(artifact.approval),
            artifact.attempts_made.to_string(),
            format_timestamp(artifact.updated_at_ms),
            truncate(&detail, 60),
        ]);
    }
    format!("{}\n\nTotal: {} artifact(s)", table, artifacts.len())
}

fn list_entry(artifact: &Artifact) -> serde_json::Value {
    json!({
        "id": artifact.id.to_string(),
        "parent_id": artifact.parent_id.map(|id| id.to_string()),
        "request_key": artifact.request_key,
        "kind": kind_str(artifact.kind),
        "status": artifact.status.as_str(),
        "approval": artifact.approval.as_str(),
        "attempts_made": artifact.attempts_made,
        "image": artifact.payload.as_ref().map(|p| p.describe()),
        "error_detail": artifact.error_detail,
        "created_at": format_timestamp(artifact.created_at_ms),
        "updated_at": format_timestamp(artifact.updated_at_ms),
    })
}

pub fn format_artifact_list_json(artifacts: &[Artifact]) -> String {
    let entries: Vec<_> = artifacts.iter().map(list_entry).collect();
    let out = json!({ "artifacts": entries, "total": artifacts.len() });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_artifact_detail_text(artifact: &Artifact) -> String {
    let mut output = format!("Artifact: {}\n", artifact.id);
    output.push_str(&format!("Key: {}\n", artifact.request_key));
    output.push_str(&format!("Kind: {}\n", kind_str(artifact.kind)));
    if let Some(parent) = artifact.parent_id {
        output.push_str(&format!("Parent: {}\n", parent));
    }
    output.push_str(&format!("Status: {}\n", status_cell(artifact.status)));
    output.push_str(&format!("Approval: {}\n", artifact.approval.as_str()));
    output.push_str(&format!("Attempts: {}\n", artifact.attempts_made));
    output.push_str(&format!("Prompt: {}\n", artifact.spec.prompt));
    output.push_str(&format!("Aspect ratio: {}\n", artifact.spec.aspect_ratio));
    if !artifact.spec.reference_assets.is_empty() {
        let names: Vec<&str> = artifact
            .spec
            .reference_assets
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        output.push_str(&format!("References: {}\n", names.join(", ")));
    }
    if let Some(payload) = &artifact.payload {
        output.push_str(&format!("Image: {}\n", payload.describe()));
    }
    if let Some(detail) = &artifact.error_detail {
        output.push_str(&format!("Error: {}\n", detail));
    }
    output.push_str(&format!("Created: {}\n", format_timestamp(artifact.created_at_ms)));
    output.push_str(&format!("Updated: {}", format_timestamp(artifact.updated_at_ms)));
    output
}

pub fn format_artifact_detail_json(artifact: &Artifact) -> String {
    serde_json::to_string_pretty(artifact).unwrap_or_else(|_| "{}".to_string())
}
