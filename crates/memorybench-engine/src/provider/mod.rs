//! Memory provider contract.
//!
//! A [`Provider`] is the system under test: it ingests a question's haystack
//! sessions into an isolated container, indexes them asynchronously, and
//! answers search queries against that container. Implementations are
//! selected by `provider.kind` in the benchmark config.

mod in_memory;
mod poll;

use std::fmt::Write as _;

use async_trait::async_trait;
use memorybench_types::checkpoint::{IndexingProgress, IngestResult};
use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::dataset::{Question, Session};
use memorybench_types::error::ProviderError;

pub use in_memory::{InMemoryProvider, InMemorySettings};
pub use poll::PollBackoff;

/// Options for [`Provider::ingest`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Isolation namespace for this question's data.
    pub container_tag: String,
    pub question_date: Option<String>,
}

/// Options for [`Provider::search`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub container_tag: String,
    pub limit: usize,
    pub question_date: Option<String>,
}

/// Cumulative indexing progress sink passed to [`Provider::await_indexing`].
pub type ProgressCallback<'a> = &'a (dyn Fn(IndexingProgress) + Send + Sync);

/// Memory system under benchmark.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, recorded in the run checkpoint.
    fn name(&self) -> &str;

    /// Provider-declared worker counts, used when the run sets none.
    fn concurrency(&self) -> ConcurrencyOverrides {
        ConcurrencyOverrides::default()
    }

    /// Apply the `provider.config` section before any other call.
    async fn initialize(&mut self, config: &serde_json::Value) -> Result<(), ProviderError>;

    /// Store `sessions` under `options.container_tag`.
    async fn ingest(
        &self,
        sessions: &[Session],
        options: &IngestOptions,
    ) -> Result<IngestResult, ProviderError>;

    /// Block until every episode of `result` is indexed or failed.
    ///
    /// `on_progress` receives the full completed/failed id sets seen so far
    /// (never deltas), as often as the provider observes a change.
    async fn await_indexing(
        &self,
        result: &IngestResult,
        container_tag: &str,
        on_progress: ProgressCallback<'_>,
    ) -> Result<(), ProviderError>;

    /// Raw, provider-specific search results for `query`.
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<serde_json::Value>, ProviderError>;

    /// Remove everything stored under `container_tag`.
    async fn clear(&self, container_tag: &str) -> Result<(), ProviderError>;

    /// Prompt handed to the answer model for `question`.
    fn answer_prompt(&self, question: &Question, results: &[serde_json::Value]) -> String {
        default_answer_prompt(question, results)
    }
}

/// Plain prompt: retrieved context followed by the question.
#[must_use]
pub fn default_answer_prompt(question: &Question, results: &[serde_json::Value]) -> String {
    let mut context = String::new();
    for (rank, result) in results.iter().enumerate() {
        let text = result
            .get("content")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| result.to_string(), str::to_string);
        let _ = writeln!(context, "[{}] {text}", rank + 1);
    }
    if context.is_empty() {
        context.push_str("(no memories retrieved)\n");
    }

    let date = question
        .question_date
        .as_deref()
        .map(|d| format!("Current date: {d}\n"))
        .unwrap_or_default();

    format!(
        "You are answering a question using retrieved memories.\n\n\
         Memories:\n{context}\n{date}Question: {}\n\
         Answer concisely. If the memories do not contain the answer, say you don't know.",
        question.question
    )
}

/// Build an uninitialized provider for a config `kind`.
///
/// # Errors
///
/// Returns a config [`ProviderError`] for unknown kinds.
pub fn create_provider(kind: &str) -> Result<Box<dyn Provider>, ProviderError> {
    match kind {
        InMemoryProvider::KIND => Ok(Box::new(InMemoryProvider::default())),
        other => Err(ProviderError::config(
            "UNKNOWN_PROVIDER",
            format!("unknown provider kind '{other}' (available: {})", InMemoryProvider::KIND),
        )),
    }
}
