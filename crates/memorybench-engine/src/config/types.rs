//! Benchmark YAML configuration types.

use std::path::{Path, PathBuf};

use memorybench_types::concurrency::ConcurrencyOverrides;
use serde::{Deserialize, Serialize};

/// Root of a benchmark YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkConfig {
    pub version: String,
    pub benchmark: String,
    /// Path to the dataset JSON (or JSON Lines) file.
    pub dataset: PathBuf,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub answer_model: AnswerModelConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub search: SearchConfig,
    /// Run-level worker counts; provider defaults apply where unset.
    #[serde(default)]
    pub concurrency: Option<ConcurrencyOverrides>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: String,
    /// Provider-specific settings, handed to `Provider::initialize`.
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerModelConfig {
    #[serde(default = "default_answer_model")]
    pub kind: String,
}

impl Default for AnswerModelConfig {
    fn default() -> Self {
        Self {
            kind: default_answer_model(),
        }
    }
}

fn default_answer_model() -> String {
    "extractive".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JudgeConfig {
    #[serde(default = "default_judge")]
    pub kind: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            kind: default_judge(),
        }
    }
}

fn default_judge() -> String {
    "containment".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Extra attempts for provider errors marked retryable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

/// Checkpoint storage backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackendKind {
    #[default]
    Sqlite,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackendKind,
    /// Database file (sqlite) or directory (file). Defaults under `output_dir`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl BenchmarkConfig {
    /// Where checkpoints for this benchmark live.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        match (&self.checkpoint.path, self.checkpoint.backend) {
            (Some(path), _) => path.clone(),
            (None, CheckpointBackendKind::Sqlite) => self.output_dir.join("checkpoints.db"),
            (None, CheckpointBackendKind::File) => self.output_dir.join("checkpoints"),
        }
    }

    /// Make relative paths relative to the directory holding the config file.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };
        rebase(&mut self.dataset);
        rebase(&mut self.output_dir);
        if let Some(path) = self.checkpoint.path.as_mut() {
            rebase(path);
        }
    }
}
