//! Checkpoint backend and collaborator creation from benchmark config.

use std::sync::Arc;

use anyhow::{Context, Result};
use memorybench_state::{
    ArtifactDir, CheckpointBackend, FileCheckpointBackend, SqliteCheckpointBackend,
};
use memorybench_types::state::RunId;

use crate::config::types::{BenchmarkConfig, CheckpointBackendKind};
use crate::model::{create_answer_model, create_judge};
use crate::orchestrator::Collaborators;
use crate::provider::create_provider;

/// Open the checkpoint backend named by `checkpoint.backend`.
///
/// # Errors
///
/// Returns an error if the database or directory cannot be opened.
pub fn create_checkpoint_backend(config: &BenchmarkConfig) -> Result<Arc<dyn CheckpointBackend>> {
    let path = config.checkpoint_path();
    match config.checkpoint.backend {
        CheckpointBackendKind::Sqlite => {
            let backend = SqliteCheckpointBackend::open(&path)
                .with_context(|| format!("Failed to open checkpoint DB: {}", path.display()))?;
            Ok(Arc::new(backend) as Arc<dyn CheckpointBackend>)
        }
        CheckpointBackendKind::File => {
            let backend = FileCheckpointBackend::open(&path).with_context(|| {
                format!("Failed to open checkpoint directory: {}", path.display())
            })?;
            Ok(Arc::new(backend) as Arc<dyn CheckpointBackend>)
        }
    }
}

/// Build the provider, answer model and judge named in the config.
///
/// # Errors
///
/// Returns an error for unknown kinds.
pub fn create_collaborators(config: &BenchmarkConfig) -> Result<Collaborators> {
    let provider = create_provider(&config.provider.kind).context("Invalid provider.kind")?;
    let answer_model =
        create_answer_model(&config.answer_model.kind).context("Invalid answer_model.kind")?;
    let judge = create_judge(&config.judge.kind).context("Invalid judge.kind")?;
    Ok(Collaborators {
        provider,
        provider_config: config.provider.config.clone(),
        answer_model: Arc::from(answer_model),
        judge: Arc::from(judge),
    })
}

/// Artifact directory for one run under `output_dir`.
#[must_use]
pub fn artifact_dir(config: &BenchmarkConfig, run_id: &RunId) -> ArtifactDir {
    ArtifactDir::new(&config.output_dir, run_id)
}
