//! Self-contained provider backed by process memory.
//!
//! Documents become searchable only after a simulated indexing delay, and
//! every n-th ingested document can be made to fail indexing, so the full
//! pipeline (including partial indexing failures) runs without any external
//! service.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use memorybench_types::checkpoint::{IndexingProgress, IngestResult};
use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::dataset::Session;
use memorybench_types::error::ProviderError;
use memorybench_types::phase::Phase;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;

use super::poll::PollBackoff;
use super::{IngestOptions, ProgressCallback, Provider, SearchOptions};
use crate::text::terms;

/// `provider.config` for [`InMemoryProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InMemorySettings {
    /// Time from ingest until a document is searchable.
    pub index_delay_ms: u64,
    /// Fail indexing of every n-th ingested document.
    pub fail_every_nth: Option<usize>,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    /// Worker counts this provider declares as its defaults.
    pub concurrency: ConcurrencyOverrides,
}

impl Default for InMemorySettings {
    fn default() -> Self {
        Self {
            index_delay_ms: 0,
            fail_every_nth: None,
            poll_initial_ms: 25,
            poll_max_ms: 1_000,
            concurrency: ConcurrencyOverrides::uniform(8).with_phase(Phase::Indexing, 16),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    session_id: String,
    date: Option<String>,
    content: String,
    terms: BTreeSet<String>,
    ready_at: Instant,
    failed: bool,
}

#[derive(Debug, Default)]
struct Store {
    containers: HashMap<String, Vec<StoredDocument>>,
    ingested: usize,
}

/// In-process memory provider.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    settings: InMemorySettings,
    store: Mutex<Store>,
}

impl InMemoryProvider {
    pub const KIND: &'static str = "in_memory";

    #[must_use]
    pub fn with_settings(settings: InMemorySettings) -> Self {
        Self {
            settings,
            store: Mutex::default(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, ProviderError> {
        self.store
            .lock()
            .map_err(|_| ProviderError::internal("LOCK_POISONED", "in-memory store lock poisoned"))
    }

    fn indexing_status(
        &self,
        container_tag: &str,
        episodes: &[String],
    ) -> Result<IndexingProgress, ProviderError> {
        let store = self.lock()?;
        let documents = store.containers.get(container_tag).ok_or_else(|| {
            ProviderError::provider(
                "UNKNOWN_CONTAINER",
                format!("container '{container_tag}' does not exist"),
            )
        })?;

        let now = Instant::now();
        let mut progress = IndexingProgress {
            total: episodes.len(),
            ..IndexingProgress::default()
        };
        for episode in episodes {
            match documents.iter().find(|d| &d.id == episode) {
                Some(doc) if doc.failed => progress.failed_ids.push(episode.clone()),
                Some(doc) if doc.ready_at <= now => progress.completed_ids.push(episode.clone()),
                Some(_) => {}
                None => progress.failed_ids.push(episode.clone()),
            }
        }
        Ok(progress)
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn concurrency(&self) -> ConcurrencyOverrides {
        self.settings.concurrency
    }

    async fn initialize(&mut self, config: &serde_json::Value) -> Result<(), ProviderError> {
        let settings: InMemorySettings = if config.is_null() {
            InMemorySettings::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| {
                ProviderError::config("INVALID_CONFIG", format!("in_memory provider: {e}"))
            })?
        };
        if settings.poll_initial_ms == 0 {
            return Err(ProviderError::config(
                "INVALID_CONFIG",
                "in_memory provider: poll_initial_ms must be > 0",
            ));
        }
        tracing::debug!(
            index_delay_ms = settings.index_delay_ms,
            fail_every_nth = ?settings.fail_every_nth,
            "Initialized in-memory provider"
        );
        self.settings = settings;
        Ok(())
    }

    async fn ingest(
        &self,
        sessions: &[Session],
        options: &IngestOptions,
    ) -> Result<IngestResult, ProviderError> {
        if options.container_tag.is_empty() {
            return Err(ProviderError::data(
                "EMPTY_CONTAINER_TAG",
                "container tag must not be empty",
            ));
        }

        let ready_at = Instant::now() + Duration::from_millis(self.settings.index_delay_ms);
        let mut store = self.lock()?;
        let mut document_ids = Vec::with_capacity(sessions.len());

        for session in sessions.iter().filter(|s| !s.messages.is_empty()) {
            store.ingested += 1;
            let failed = self
                .settings
                .fail_every_nth
                .is_some_and(|n| n > 0 && store.ingested % n == 0);
            let content = session.transcript();
            let doc = StoredDocument {
                id: format!("{}/{}", options.container_tag, session.session_id),
                session_id: session.session_id.clone(),
                date: session.date.clone(),
                terms: terms(&content),
                content,
                ready_at,
                failed,
            };
            document_ids.push(doc.id.clone());

            let container = store
                .containers
                .entry(options.container_tag.clone())
                .or_default();
            container.retain(|d| d.id != doc.id);
            container.push(doc);
        }
        // An empty haystack still gets a container so indexing polls resolve.
        store
            .containers
            .entry(options.container_tag.clone())
            .or_default();

        Ok(IngestResult {
            document_ids,
            task_ids: Vec::new(),
        })
    }

    async fn await_indexing(
        &self,
        result: &IngestResult,
        container_tag: &str,
        on_progress: ProgressCallback<'_>,
    ) -> Result<(), ProviderError> {
        let episodes = result.episode_ids();
        let initial = Duration::from_millis(self.settings.poll_initial_ms);
        let mut backoff = PollBackoff::new(initial, Duration::from_millis(self.settings.poll_max_ms));
        let mut last_settled = None;

        loop {
            let progress = self.indexing_status(container_tag, episodes)?;
            let settled = progress.settled();
            let finished = settled >= progress.total;
            if last_settled != Some(settled) {
                last_settled = Some(settled);
                backoff.reset(initial);
                on_progress(progress);
            }
            if finished {
                return Ok(());
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        let query_terms = terms(query);
        if query_terms.is_empty() || options.limit == 0 {
            return Ok(Vec::new());
        }

        let store = self.lock()?;
        // A container lost with the process must not pass for "no matches".
        let documents = store.containers.get(&options.container_tag).ok_or_else(|| {
            ProviderError::provider(
                "UNKNOWN_CONTAINER",
                format!("container '{}' does not exist", options.container_tag),
            )
        })?;

        let now = Instant::now();
        #[allow(clippy::cast_precision_loss)]
        let mut scored: Vec<(f64, &StoredDocument)> = documents
            .iter()
            .filter(|d| !d.failed && d.ready_at <= now)
            .filter_map(|d| {
                let overlap = d.terms.intersection(&query_terms).count();
                (overlap > 0).then(|| (overlap as f64 / query_terms.len() as f64, d))
            })
            .collect();
        scored.sort_by(|(a, da), (b, db)| b.total_cmp(a).then_with(|| da.id.cmp(&db.id)));

        Ok(scored
            .into_iter()
            .take(options.limit)
            .map(|(score, d)| {
                json!({
                    "id": d.id,
                    "session_id": d.session_id,
                    "content": d.content,
                    "score": score,
                    "date": d.date,
                })
            })
            .collect())
    }

    async fn clear(&self, container_tag: &str) -> Result<(), ProviderError> {
        let removed = self.lock()?.containers.remove(container_tag);
        tracing::debug!(
            container_tag,
            documents = removed.map_or(0, |docs| docs.len()),
            "Cleared container"
        );
        Ok(())
    }
}
