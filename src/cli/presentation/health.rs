//! Health presentation.

use crate::cli::presentation::shared::format_section_heading;
use crate::telemetry::HealthReport;
use comfy_table::Table;

pub fn format_health_text(report: &HealthReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", format_section_heading("Work Items")));
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Status", "Count"]);
    for (status, count) in &report.work_items {
        table.add_row(vec![status.to_string(), count.to_string()]);
    }
    out.push_str(&format!("{}\n", table));
    out.push_str(&format!("Total: {}\n\n", report.total_work_items()));

    out.push_str(&format!("{}\n", format_section_heading("Attempts")));
    if report.attempt_distribution.is_empty() {
        out.push_str("No work items.\n\n");
    } else {
        for (attempt, count) in &report.attempt_distribution {
            out.push_str(&format!("  attempt {:<3} {}\n", attempt, count));
        }
        out.push('\n');
    }

    out.push_str(&format!("{}\n", format_section_heading("Artifacts")));
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Status", "Count"]);
    for (status, count) in &report.artifacts {
        table.add_row(vec![status.to_string(), count.to_string()]);
    }
    out.push_str(&format!("{}\n\n", table));

    out.push_str(&format!("{}\n", format_section_heading("Rolling Windows")));
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec![
        "Window",
        "Completed",
        "Failed",
        "Success",
        "Retries",
        "Tokens",
        "Validations (pass/fail)",
    ]);
    for window in &report.windows {
        let success = window
            .success_rate
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            format!("{}h", window.hours()),
            window.completed.to_string(),
            window.failed.to_string(),
            success,
            window.retries.to_string(),
            window.tokens.to_string(),
            format!("{}/{}", window.validations_passed, window.validations_failed),
        ]);
    }
    out.push_str(&table.to_string());
    out
}
