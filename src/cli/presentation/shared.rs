//! Shared presentation helpers: headings, timestamps, status colouring.

use crate::content::ArtifactStatus;
use crate::queue::WorkItemStatus;
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

/// Section heading in bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

/// Epoch milliseconds as an RFC 3339 UTC timestamp.
pub fn format_millis(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

pub fn colored_work_status(status: WorkItemStatus) -> String {
    match status {
        WorkItemStatus::Pending => status.as_str().cyan().to_string(),
        WorkItemStatus::Processing => status.as_str().yellow().to_string(),
        WorkItemStatus::Completed => status.as_str().green().to_string(),
        WorkItemStatus::Failed => status.as_str().red().to_string(),
    }
}

pub fn colored_artifact_status(status: ArtifactStatus) -> String {
    match status {
        ArtifactStatus::Draft => status.as_str().dimmed().to_string(),
        ArtifactStatus::Staged => status.as_str().cyan().to_string(),
        ArtifactStatus::Approved => status.as_str().blue().to_string(),
        ArtifactStatus::Published => status.as_str().green().to_string(),
        ArtifactStatus::Rejected | ArtifactStatus::PublishFailed => {
            status.as_str().red().to_string()
        }
    }
}
