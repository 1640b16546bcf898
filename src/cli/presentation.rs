//! CLI presentation: text and json formatters per command family.

mod artifact;
mod health;
mod shared;
mod work_item;

pub use artifact::{format_artifact_list_text, format_artifact_text};
pub use health::format_health_text;
pub use shared::{format_millis, format_section_heading};
pub use work_item::{format_outcomes_text, format_status_text, format_submitted_text};
