//! CLI route: single route table and run context. Dispatches to the pipeline and presentation.

use crate::classify::CollaboratorError;
use crate::cli::output::to_json;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_artifact_list_text, format_artifact_text, format_health_text, format_outcomes_text,
    format_status_text, format_submitted_text,
};
use crate::cli::{command_name, is_mutating};
use crate::collaborator::http::{HttpGenerator, HttpPublisher};
use crate::collaborator::scripted::{ScriptedGenerator, ScriptedPublisher};
use crate::collaborator::{GeneratedContent, GenerationRequest, Generator, PublishedRef, Publisher};
use crate::config::{ConfigLoader, GatehouseConfig};
use crate::content::{Artifact, ArtifactStatus, ContentKind, TaxonomyRefs};
use crate::error::PipelineError;
use crate::orchestrator::{Pipeline, WorkerPool};
use crate::queue::RetryQueue;
use crate::store::persistence::SledLifecycleStore;
use crate::store::LifecycleStore;
use crate::types::{ArtifactId, WorkItemId};
use crate::validation::Taxonomy;
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span};

/// Runtime context for CLI execution: effective config and the opened queue.
pub struct RunContext {
    config: GatehouseConfig,
    queue: Arc<RetryQueue>,
    taxonomy: Arc<Taxonomy>,
}

impl RunContext {
    /// Load and validate config, then open the store it names.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config.validate().map_err(|errors| {
            PipelineError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        let store_path = resolve_store_path(&workspace_root, &config.storage.path);
        std::fs::create_dir_all(&store_path)?;
        let store: Arc<dyn LifecycleStore> = Arc::new(SledLifecycleStore::new(&store_path)?);
        info!(store_path = %store_path.display(), "Opened lifecycle store");

        let queue = Arc::new(RetryQueue::new(store, config.retry_policy()));
        let taxonomy = Arc::new(config.taxonomy.clone());
        Ok(Self {
            config,
            queue,
            taxonomy,
        })
    }

    fn pipeline(
        &self,
        generator: Arc<dyn Generator>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Pipeline, PipelineError> {
        Pipeline::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.taxonomy),
            generator,
            publisher,
            self.config.pipeline_settings(),
        )
    }

    /// Pipeline for commands that never call a collaborator.
    fn offline_pipeline(&self) -> Result<Pipeline, PipelineError> {
        self.pipeline(Arc::new(Offline), Arc::new(Offline))
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        let span = info_span!("command", name = command_name(command));
        let _guard = span.enter();
        let output = self.dispatch(command)?;
        if is_mutating(command) {
            self.queue.store().flush()?;
        }
        Ok(output)
    }

    fn dispatch(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Submit {
                payload_ref,
                kind,
                category,
                subcategory,
                format,
            } => self.handle_submit(payload_ref, *kind, category, subcategory, format),
            Commands::Status {
                work_item_id,
                format,
            } => self.handle_status(work_item_id, format),
            Commands::Artifact {
                artifact_id,
                status,
                body,
                format,
            } => match artifact_id {
                Some(id) => self.handle_artifact_show(id, *body, format),
                None => self.handle_artifact_list(status.as_deref(), format),
            },
            Commands::Approve { artifact_id } => {
                self.offline_pipeline()?.approve(artifact_id)?;
                Ok(format!("Approved artifact {}", artifact_id))
            }
            Commands::Reject {
                artifact_id,
                reason,
                yes,
            } => self.handle_reject(artifact_id, reason, *yes),
            Commands::Publish { artifact_id } => {
                let work_item_id = self.offline_pipeline()?.request_publish(artifact_id)?;
                Ok(format!(
                    "Publish of {} enqueued as work item {}",
                    artifact_id, work_item_id
                ))
            }
            Commands::RetryPublish { artifact_id } => {
                let work_item_id = self.offline_pipeline()?.retry_publish(artifact_id)?;
                Ok(format!(
                    "Artifact {} returned to approved; publish enqueued as work item {}",
                    artifact_id, work_item_id
                ))
            }
            Commands::Cancel { work_item_id } => {
                if self.offline_pipeline()?.cancel(work_item_id)? {
                    Ok(format!("Cancelled work item {}", work_item_id))
                } else {
                    Ok(format!("Work item {} already finished", work_item_id))
                }
            }
            Commands::Health { format } => {
                let report = self.offline_pipeline()?.health()?;
                if format == "json" {
                    Ok(to_json(&report))
                } else {
                    Ok(format_health_text(&report))
                }
            }
            Commands::Recover => {
                let report = self.offline_pipeline()?.recover()?;
                Ok(format!(
                    "Recovery sweep: {} requeued, {} failed",
                    report.requeued, report.failed
                ))
            }
            Commands::Run {
                once,
                workers,
                dry_run,
            } => self.handle_run(*once, *workers, dry_run.as_deref()),
            Commands::Config { validate } => {
                if *validate {
                    Ok("Configuration is valid".to_string())
                } else {
                    self.handle_config_show()
                }
            }
        }
    }

    fn handle_submit(
        &self,
        payload_ref: &str,
        kind: ContentKind,
        category: &Option<String>,
        subcategory: &Option<String>,
        format: &str,
    ) -> Result<String, PipelineError> {
        let taxonomy = TaxonomyRefs::new(category.clone(), subcategory.clone());
        let id = self.offline_pipeline()?.submit(payload_ref, kind, taxonomy)?;
        if format == "json" {
            Ok(to_json(&json!({ "work_item_id": id })))
        } else {
            Ok(format_submitted_text(&id))
        }
    }

    fn handle_status(&self, id: &WorkItemId, format: &str) -> Result<String, PipelineError> {
        let view = self.offline_pipeline()?.status_view(id)?;
        if format == "json" {
            Ok(to_json(&json!({
                "work_item": view.work_item,
                "reason": view.reason,
                "artifact_id": view.artifact_id,
            })))
        } else {
            Ok(format_status_text(&view))
        }
    }

    fn handle_artifact_show(
        &self,
        id: &ArtifactId,
        include_body: bool,
        format: &str,
    ) -> Result<String, PipelineError> {
        let artifact = self.offline_pipeline()?.get_artifact(id)?;
        if format == "json" {
            Ok(to_json(&artifact))
        } else {
            Ok(format_artifact_text(&artifact, include_body))
        }
    }

    fn handle_artifact_list(
        &self,
        status: Option<&str>,
        format: &str,
    ) -> Result<String, PipelineError> {
        let filter = status.map(parse_artifact_status).transpose()?;
        let artifacts: Vec<Artifact> = self
            .offline_pipeline()?
            .list_artifacts()?
            .into_iter()
            .filter(|a| filter.map_or(true, |s| a.status == s))
            .collect();
        if format == "json" {
            Ok(to_json(&artifacts))
        } else {
            Ok(format_artifact_list_text(&artifacts))
        }
    }

    fn handle_reject(
        &self,
        id: &ArtifactId,
        reason: &str,
        yes: bool,
    ) -> Result<String, PipelineError> {
        if !yes {
            use dialoguer::Confirm;
            let confirmed = Confirm::new()
                .with_prompt(format!("Reject artifact {}?", id))
                .interact()
                .map_err(|e| PipelineError::Config(format!("Failed to get user input: {}", e)))?;

            if !confirmed {
                return Ok("Rejection cancelled".to_string());
            }
        }
        self.offline_pipeline()?.reject(id, reason)?;
        Ok(format!("Rejected artifact {}", id))
    }

    fn handle_run(
        &self,
        once: bool,
        workers: Option<usize>,
        dry_run: Option<&Path>,
    ) -> Result<String, PipelineError> {
        let (generator, publisher) = self.collaborators(dry_run)?;
        let pipeline = Arc::new(self.pipeline(generator, publisher)?);
        let rt = tokio::runtime::Runtime::new()?;

        if once {
            let outcomes = rt.block_on(pipeline.run_cycle(self.config.workers.batch_size))?;
            return Ok(format_outcomes_text(&outcomes));
        }

        let mut pool_config = self.config.worker_pool_config();
        if let Some(count) = workers {
            pool_config.workers = count.max(1);
        }
        rt.block_on(async {
            let pool = WorkerPool::new(Arc::clone(&pipeline), pool_config);
            pool.start()?;
            tokio::signal::ctrl_c().await?;
            info!("Interrupt received; stopping workers");
            pool.stop().await;
            Ok::<(), PipelineError>(())
        })?;

        let report = pipeline.health()?;
        Ok(format!("Workers stopped.\n\n{}", format_health_text(&report)))
    }

    fn collaborators(
        &self,
        dry_run: Option<&Path>,
    ) -> Result<(Arc<dyn Generator>, Arc<dyn Publisher>), PipelineError> {
        if let Some(path) = dry_run {
            let text = std::fs::read_to_string(path)?;
            let body: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                PipelineError::Config(format!("Invalid dry-run body {}: {}", path.display(), e))
            })?;
            return Ok((
                Arc::new(ScriptedGenerator::always(body)),
                Arc::new(ScriptedPublisher::new()),
            ));
        }

        let settings = self.config.pipeline_settings();
        let collaborators = &self.config.collaborators;
        let generation_endpoint = collaborators.generation_endpoint.as_deref().ok_or_else(|| {
            PipelineError::Config("collaborators.generation_endpoint is not set".to_string())
        })?;
        let publish_endpoint = collaborators.publish_endpoint.as_deref().ok_or_else(|| {
            PipelineError::Config("collaborators.publish_endpoint is not set".to_string())
        })?;
        let generator = HttpGenerator::new(
            generation_endpoint,
            collaborators.api_key.clone(),
            settings.generation_timeout,
        )
        .map_err(|e| PipelineError::Config(format!("Generation collaborator: {}", e)))?;
        let publisher = HttpPublisher::new(
            publish_endpoint,
            collaborators.api_key.clone(),
            settings.publish_timeout,
        )
        .map_err(|e| PipelineError::Config(format!("Publish collaborator: {}", e)))?;
        Ok((Arc::new(generator), Arc::new(publisher)))
    }

    fn handle_config_show(&self) -> Result<String, PipelineError> {
        let mut shown = self.config.clone();
        if shown.collaborators.api_key.is_some() {
            shown.collaborators.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&shown)
            .map_err(|e| PipelineError::Config(format!("Failed to render config: {}", e)))
    }
}

fn resolve_store_path(workspace_root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        workspace_root.join(configured)
    }
}

fn parse_artifact_status(name: &str) -> Result<ArtifactStatus, PipelineError> {
    let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
    ArtifactStatus::ALL
        .into_iter()
        .find(|s| s.as_str() == normalized)
        .ok_or_else(|| PipelineError::Config(format!("Unknown artifact status '{}'", name)))
}

/// Stand-in collaborator for commands that only touch the store.
struct Offline;

#[async_trait]
impl Generator for Offline {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError> {
        Err(CollaboratorError::Unavailable(
            "no generation collaborator for this command".to_string(),
        ))
    }
}

#[async_trait]
impl Publisher for Offline {
    async fn publish(&self, _artifact: &Artifact) -> Result<PublishedRef, CollaboratorError> {
        Err(CollaboratorError::Unavailable(
            "no publish collaborator for this command".to_string(),
        ))
    }
}
