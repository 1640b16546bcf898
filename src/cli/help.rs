//! CLI command-name contract for log spans.

use crate::cli::parse::Commands;

/// Command name string recorded on the command span (e.g. "retry_publish").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Submit { .. } => "submit",
        Commands::Status { .. } => "status",
        Commands::Artifact { .. } => "artifact",
        Commands::Approve { .. } => "approve",
        Commands::Reject { .. } => "reject",
        Commands::Publish { .. } => "publish",
        Commands::RetryPublish { .. } => "retry_publish",
        Commands::Cancel { .. } => "cancel",
        Commands::Health { .. } => "health",
        Commands::Recover => "recover",
        Commands::Run { .. } => "run",
        Commands::Config { .. } => "config",
    }
}

/// True for commands that may change queue or lifecycle state.
pub fn is_mutating(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::Status { .. }
            | Commands::Artifact { .. }
            | Commands::Health { .. }
            | Commands::Config { .. }
    )
}
