//! CLI route: single route table and run context. Dispatches to the session and presentation.

use crate::artifact::{Approval, Artifact, ArtifactStatus};
use crate::backend::{create_backend, GeneratedImage, GenerationBackend};
use crate::cli::manifest;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_artifact_detail_json, format_artifact_detail_text, format_artifact_list_json,
    format_artifact_list_text, format_batch_report_json, format_batch_report_text,
    format_deleted,
};
use crate::client::GenerationClient;
use crate::config::{ConfigLoader, EaselConfig};
use crate::error::{ApiError, GenerationError};
use crate::queue::TaskOutcome;
use crate::request::GenerationSpec;
use crate::session::{BatchReport, CreativeSession};
use crate::types::ArtifactId;
use async_trait::async_trait;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Stand-in primary used when no backend is configured. Commands that generate refuse to
/// run before it could be called.
struct UnconfiguredBackend;

#[async_trait]
impl GenerationBackend for UnconfiguredBackend {
    async fn generate(&self, _spec: &GenerationSpec) -> Result<GeneratedImage, GenerationError> {
        Err(GenerationError::Backend(
            "no generation backend configured".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}

/// Runtime context for CLI execution: workspace, loaded config, and the session.
pub struct RunContext {
    workspace_root: PathBuf,
    config: EaselConfig,
    session: CreativeSession,
}

impl RunContext {
    /// Load config, open the artifact store and hydrate a session from it.
    ///
    /// Must be called inside a tokio runtime: the session's watchdog is spawned here.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        config.ensure_valid()?;

        let primary: Arc<dyn GenerationBackend> = match &config.backend {
            Some(backend) => create_backend(backend)?,
            None => Arc::new(UnconfiguredBackend),
        };
        let backup = config.backup.as_ref().map(create_backend).transpose()?;
        let client = GenerationClient::new(
            primary,
            backup,
            config.classifier.build(),
            config.client,
        );

        let store = config.storage.open(&workspace_root)?;
        let session = CreativeSession::builder(client)
            .with_store(store)
            .with_config(config.session_config())
            .build();
        let loaded = session.hydrate()?;
        debug!(loaded, "Hydrated artifacts from store");
        session.start_watchdog()?;

        Ok(Self {
            workspace_root,
            config,
            session,
        })
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub fn session(&self) -> &CreativeSession {
        &self.session
    }

    /// Stop the watchdog and close the session.
    pub async fn shutdown(self) {
        self.session.close().await;
    }

    /// Execute a command and return its output. Single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Generate { manifest, format } => {
                self.ensure_backend()?;
                let units = manifest::load_units(manifest)?;
                let report = self
                    .with_interrupt(self.session.enqueue(units))
                    .await?;
                Ok(self.format_report(&report, format))
            }
            Commands::Vary {
                parent,
                manifest,
                format,
            } => {
                self.ensure_backend()?;
                let parent_id = self.resolve_id(parent)?;
                let variations = manifest::load_variations(manifest)?;
                let report = self
                    .with_interrupt(self.session.generate_variations(parent_id, variations))
                    .await?;
                Ok(self.format_report(&report, format))
            }
            Commands::List { format, status } => {
                let mut artifacts = self.session.artifacts();
                if let Some(status) = status {
                    let wanted = parse_status(status)?;
                    artifacts.retain(|a| a.status == wanted);
                }
                Ok(match format.as_str() {
                    "json" => format_artifact_list_json(&artifacts),
                    _ => format_artifact_list_text(&artifacts),
                })
            }
            Commands::Show { id, format } => {
                let id = self.resolve_id(id)?;
                let artifact = self
                    .session
                    .artifact(&id)
                    .ok_or(ApiError::ArtifactNotFound(id))?;
                Ok(match format.as_str() {
                    "json" => format_artifact_detail_json(&artifact),
                    _ => format_artifact_detail_text(&artifact),
                })
            }
            Commands::Approve { id } => self.handle_approval(id, Approval::Approved),
            Commands::Reject { id } => self.handle_approval(id, Approval::Rejected),
            Commands::Delete { id } => {
                let id = self.resolve_id(id)?;
                let removed = self.session.delete(&id)?;
                Ok(format_deleted(&removed))
            }
            Commands::Retry { id } => {
                self.ensure_backend()?;
                let id = self.resolve_id(id)?;
                let outcome = self.with_interrupt(self.session.retry(&id)).await?;
                let artifact = self.session.artifact(&id);
                Ok(format_retry(&id, outcome, artifact.as_ref()))
            }
        }
    }

    fn ensure_backend(&self) -> Result<(), ApiError> {
        if self.config.backend.is_some() {
            Ok(())
        } else {
            Err(ApiError::ConfigError(
                "No [backend] configured. Add one to config/config.toml or pass --config."
                    .to_string(),
            ))
        }
    }

    fn handle_approval(&self, id: &str, decision: Approval) -> Result<String, ApiError> {
        let id = self.resolve_id(id)?;
        let artifact = self.session.set_approval(&id, decision)?;
        Ok(format!(
            "Artifact {} is {}",
            artifact.id,
            artifact.approval.as_str()
        ))
    }

    /// Run `work`, turning Ctrl-C into a stop request for the running batch.
    async fn with_interrupt<T>(
        &self,
        work: impl std::future::Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let watcher = self.spawn_interrupt_watcher();
        let result = work.await;
        watcher.abort();
        result
    }

    fn spawn_interrupt_watcher(&self) -> JoinHandle<()> {
        let session = self.session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current task");
                eprintln!("Stopping after the current task...");
                session.request_stop();
            }
        })
    }

    fn format_report(&self, report: &BatchReport, format: &str) -> String {
        let artifacts: Vec<Artifact> = report
            .artifacts
            .iter()
            .filter_map(|id| self.session.artifact(id))
            .collect();
        info!(
            completed = report.summary.completed,
            failed = report.summary.failed,
            skipped = report.summary.skipped,
            "Batch finished"
        );
        match format {
            "json" => format_batch_report_json(report, &artifacts),
            _ => format_batch_report_text(report, &artifacts),
        }
    }

    /// Accept a full id or a unique prefix of one.
    fn resolve_id(&self, raw: &str) -> Result<ArtifactId, ApiError> {
        let raw = raw.trim();
        if let Ok(id) = ArtifactId::from_str(raw) {
            return Ok(id);
        }
        let prefix = raw.replace('-', "").to_ascii_lowercase();
        if prefix.is_empty() {
            return Err(ApiError::InvalidRequest("artifact id cannot be empty".to_string()));
        }
        let matches: Vec<ArtifactId> = self
            .session
            .artifacts()
            .iter()
            .map(|a| a.id)
            .filter(|id| id.as_uuid().simple().to_string().starts_with(&prefix))
            .collect();
        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(ApiError::InvalidRequest(format!(
                "No artifact matches '{}'",
                raw
            ))),
            _ => Err(ApiError::InvalidRequest(format!(
                "'{}' matches {} artifacts; use a longer prefix",
                raw,
                matches.len()
            ))),
        }
    }
}

fn parse_status(raw: &str) -> Result<ArtifactStatus, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" => Ok(ArtifactStatus::Pending),
        "generating" => Ok(ArtifactStatus::Generating),
        "completed" => Ok(ArtifactStatus::Completed),
        "failed" => Ok(ArtifactStatus::Failed),
        other => Err(ApiError::InvalidRequest(format!(
            "Unknown status '{}' (expected pending, generating, completed or failed)",
            other
        ))),
    }
}

fn format_retry(id: &ArtifactId, outcome: TaskOutcome, artifact: Option<&Artifact>) -> String {
    match (outcome, artifact) {
        (TaskOutcome::Completed, _) => format!("Artifact {} regenerated", id),
        (TaskOutcome::Failed, Some(artifact)) => format!(
            "Artifact {} failed again: {}",
            id,
            artifact.error_detail.as_deref().unwrap_or("unknown error")
        ),
        (TaskOutcome::Failed, None) => format!("Artifact {} failed again", id),
        (TaskOutcome::Skipped, _) | (TaskOutcome::Discarded, _) => {
            format!("Retry of artifact {} did not finish", id)
        }
    }
}
