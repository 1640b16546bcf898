//! Work item presentation: submit receipt, status view, run-cycle outcomes.

use crate::cli::presentation::shared::{colored_work_status, format_millis};
use crate::orchestrator::{ItemOutcome, StatusView};
use crate::queue::{WorkItemStatus, WorkPurpose};
use crate::types::WorkItemId;
use comfy_table::Table;

pub fn format_submitted_text(id: &WorkItemId) -> String {
    format!("Submitted work item {}", id)
}

pub fn format_status_text(view: &StatusView) -> String {
    let item = &view.work_item;
    let mut output = format!("Work item: {}\n", item.id);
    output.push_str(&format!("Status: {}\n", colored_work_status(item.status)));
    let purpose = match item.purpose {
        WorkPurpose::Generate => "generate".to_string(),
        WorkPurpose::Publish { artifact_id } => format!("publish {}", artifact_id),
    };
    output.push_str(&format!("Purpose: {}\n", purpose));
    output.push_str(&format!("Kind: {}\n", item.kind));
    output.push_str(&format!("Payload: {}\n", item.payload_ref));
    output.push_str(&format!("Attempt: {}\n", item.attempt));
    if item.status == WorkItemStatus::Pending {
        output.push_str(&format!(
            "Next eligible: {}\n",
            format_millis(item.next_eligible_at_ms)
        ));
    }
    if let Some(err) = &item.last_error {
        output.push_str(&format!("Last error: [{}] {}\n", err.kind, err.message));
    }
    if let Some(reason) = &view.reason {
        output.push_str(&format!("Reason: {}\n", reason));
    }
    if let Some(artifact_id) = &view.artifact_id {
        output.push_str(&format!("Artifact: {}\n", artifact_id));
    }
    output.push_str(&format!("Created: {}", format_millis(item.created_at_ms)));
    output
}

pub fn format_outcomes_text(outcomes: &[(WorkItemId, ItemOutcome)]) -> String {
    if outcomes.is_empty() {
        return "No due work items.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Work Item", "Outcome", "Detail"]);
    for (id, outcome) in outcomes {
        let (label, detail) = match outcome {
            ItemOutcome::Staged { artifact_id } => ("staged", artifact_id.to_string()),
            ItemOutcome::Rejected { artifact_id } => ("rejected", artifact_id.to_string()),
            ItemOutcome::Published { artifact_id } => ("published", artifact_id.to_string()),
            ItemOutcome::PublishFailed { artifact_id } => {
                ("publish_failed", artifact_id.to_string())
            }
            ItemOutcome::Retrying {
                attempt,
                next_eligible_at_ms,
            } => (
                "retrying",
                format!("attempt {} at {}", attempt, format_millis(*next_eligible_at_ms)),
            ),
            ItemOutcome::Failed => ("failed", String::new()),
            ItemOutcome::Skipped => ("skipped", String::new()),
            ItemOutcome::Released => ("released", String::new()),
        };
        table.add_row(vec![id.to_string(), label.to_string(), detail]);
    }
    table.to_string()
}
