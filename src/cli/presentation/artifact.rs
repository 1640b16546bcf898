//! Artifact presentation: detail view with validation history, and list table.

use crate::cli::presentation::shared::{colored_artifact_status, format_millis};
use crate::content::Artifact;
use comfy_table::Table;

pub fn format_artifact_text(artifact: &Artifact, include_body: bool) -> String {
    let mut output = format!("Artifact: {}\n", artifact.id);
    output.push_str(&format!(
        "Status: {}\n",
        colored_artifact_status(artifact.status)
    ));
    output.push_str(&format!("Kind: {}\n", artifact.kind));
    if let Some(title) = artifact.title() {
        output.push_str(&format!("Title: {}\n", title));
    }
    output.push_str(&format!("Source work item: {}\n", artifact.source_work_item));
    output.push_str(&format!("Body digest: {}\n", artifact.body_digest));
    if let Some(reason) = &artifact.rejection_reason {
        output.push_str(&format!("Rejection reason: {}\n", reason));
    }
    if let Some(reference) = &artifact.published_ref {
        output.push_str(&format!("Published as: {}\n", reference));
    }
    if let Some(err) = &artifact.last_publish_error {
        output.push_str(&format!(
            "Last publish error ({} attempts): {}\n",
            artifact.publish_attempts, err
        ));
    }

    output.push_str(&format!(
        "\nValidation runs: {}\n",
        artifact.validation_history.len()
    ));
    for record in &artifact.validation_history {
        output.push_str(&format!(
            "  {} {} ({})\n",
            format_millis(record.run_at_ms),
            if record.passed { "passed" } else { "failed" },
            &record.body_digest[..record.body_digest.len().min(12)]
        ));
        for result in record.failed_layers() {
            for err in &result.errors {
                output.push_str(&format!("    [{}] {}\n", result.layer, err));
            }
        }
    }

    if include_body {
        output.push_str("\nBody:\n");
        output.push_str(
            &serde_json::to_string_pretty(&artifact.body).unwrap_or_else(|_| "{}".to_string()),
        );
    }
    output.trim_end().to_string()
}

pub fn format_artifact_list_text(artifacts: &[Artifact]) -> String {
    if artifacts.is_empty() {
        return "No artifacts found.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Artifact", "Kind", "Status", "Title", "Updated"]);
    for artifact in artifacts {
        table.add_row(vec![
            artifact.id.to_string(),
            artifact.kind.to_string(),
            artifact.status.to_string(),
            artifact.title().unwrap_or("-").to_string(),
            format_millis(artifact.updated_at_ms),
        ]);
    }
    format!("{}\n\nTotal: {} artifact(s)", table, artifacts.len())
}
