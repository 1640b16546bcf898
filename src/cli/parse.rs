//! CLI parse: clap types for Gatehouse. No behavior; definitions only.

use crate::content::ContentKind;
use crate::types::{ArtifactId, WorkItemId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Gatehouse CLI - retry-scheduled generation with validation-gated publishing
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Durable retry scheduling and validation-gated publishing for generated content")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a generation request
    Submit {
        /// Reference to the source material
        payload_ref: String,
        /// Content kind (article, quiz, course, video-script, transcript-correction)
        #[arg(long)]
        kind: ContentKind,
        /// Taxonomy category id
        #[arg(long)]
        category: Option<String>,
        /// Taxonomy subcategory id
        #[arg(long)]
        subcategory: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show a work item
    Status {
        work_item_id: WorkItemId,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show one artifact, or list artifacts when no id is given
    Artifact {
        artifact_id: Option<ArtifactId>,
        /// Only list artifacts in this status (e.g. staged)
        #[arg(long)]
        status: Option<String>,
        /// Include the artifact body
        #[arg(long)]
        body: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Approve a staged artifact
    Approve { artifact_id: ArtifactId },
    /// Reject a staged artifact
    Reject {
        artifact_id: ArtifactId,
        /// Reason recorded on the artifact
        #[arg(long)]
        reason: String,
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Enqueue publishing of an approved artifact
    Publish { artifact_id: ArtifactId },
    /// Return a publish-failed artifact to approved and enqueue publishing again
    RetryPublish { artifact_id: ArtifactId },
    /// Cancel a pending or in-flight work item
    Cancel { work_item_id: WorkItemId },
    /// Show queue, lifecycle and rolling-window health
    Health {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Requeue or fail work items stuck in processing
    Recover,
    /// Run pipeline workers
    Run {
        /// Process one batch of due items and exit
        #[arg(long)]
        once: bool,
        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,
        /// Replay this JSON body as every generation result and publish in memory
        #[arg(long, value_name = "BODY_JSON")]
        dry_run: Option<PathBuf>,
    },
    /// Show or validate the effective configuration
    Config {
        /// Only validate; print nothing on success
        #[arg(long)]
        validate: bool,
    },
}
