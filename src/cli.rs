//! CLI domain: parse, route, help, output, and presentation only.
//! No pipeline logic; a single route table dispatches to the pipeline.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{command_name, is_mutating};
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_artifact_list_text, format_artifact_text, format_health_text, format_millis,
    format_outcomes_text, format_section_heading, format_status_text, format_submitted_text,
};
pub use route::RunContext;
