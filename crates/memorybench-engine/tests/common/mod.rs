#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memorybench_engine::model::{ContainmentJudge, ExtractiveAnswerModel};
use memorybench_engine::provider::{IngestOptions, ProgressCallback, Provider, SearchOptions};
use memorybench_engine::{Collaborators, RunRequest};
use memorybench_state::error::Result as StateResult;
use memorybench_state::{CheckpointBackend, SqliteCheckpointBackend, StateError};
use memorybench_types::checkpoint::{IndexingProgress, IngestResult, PhaseStatus, RunCheckpoint};
use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::dataset::{Message, Question, Session};
use memorybench_types::error::ProviderError;
use memorybench_types::phase::Phase;
use memorybench_types::state::{QuestionId, RunId};
use serde_json::json;

/// Per-operation call counters, shared with the test after the provider is
/// handed to the run driver.
#[derive(Debug, Default)]
pub struct Calls {
    pub initialize: AtomicUsize,
    pub ingest: AtomicUsize,
    pub await_indexing: AtomicUsize,
    pub search: AtomicUsize,
    pub clear: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.initialize.load(Ordering::SeqCst)
            + self.ingest.load(Ordering::SeqCst)
            + self.await_indexing.load(Ordering::SeqCst)
            + self.search.load(Ordering::SeqCst)
            + self.clear.load(Ordering::SeqCst)
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Provider whose failures are scripted per question id.
pub struct ScriptedProvider {
    pub calls: Arc<Calls>,
    fail_ingest: BTreeSet<String>,
    fail_indexing: BTreeSet<String>,
    stall_indexing: BTreeSet<String>,
    delay: Duration,
    concurrency: ConcurrencyOverrides,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            fail_ingest: BTreeSet::new(),
            fail_indexing: BTreeSet::new(),
            stall_indexing: BTreeSet::new(),
            delay: Duration::ZERO,
            concurrency: ConcurrencyOverrides::default(),
        }
    }

    pub fn failing_ingest(mut self, question: &str) -> Self {
        self.fail_ingest.insert(question.to_string());
        self
    }

    pub fn failing_indexing(mut self, question: &str) -> Self {
        self.fail_indexing.insert(question.to_string());
        self
    }

    /// Report the first episode indexed, then fail the indexing wait.
    pub fn stalling_indexing(mut self, question: &str) -> Self {
        self.stall_indexing.insert(question.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyOverrides) -> Self {
        self.concurrency = concurrency;
        self
    }

    fn scripted(set: &BTreeSet<String>, container_tag: &str) -> bool {
        set.iter().any(|q| container_tag.starts_with(&format!("{q}-")))
    }

    async fn busy(&self) {
        let now = self.calls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn concurrency(&self) -> ConcurrencyOverrides {
        self.concurrency
    }

    async fn initialize(&mut self, _config: &serde_json::Value) -> Result<(), ProviderError> {
        self.calls.initialize.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ingest(
        &self,
        sessions: &[Session],
        options: &IngestOptions,
    ) -> Result<IngestResult, ProviderError> {
        self.calls.ingest.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        if Self::scripted(&self.fail_ingest, &options.container_tag) {
            return Err(ProviderError::provider("REJECTED", "ingest rejected"));
        }
        Ok(IngestResult {
            document_ids: sessions
                .iter()
                .map(|s| format!("{}/{}", options.container_tag, s.session_id))
                .collect(),
            task_ids: vec![],
        })
    }

    async fn await_indexing(
        &self,
        result: &IngestResult,
        container_tag: &str,
        on_progress: ProgressCallback<'_>,
    ) -> Result<(), ProviderError> {
        self.calls.await_indexing.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        if Self::scripted(&self.fail_indexing, container_tag) {
            return Err(ProviderError::provider("INDEX_DOWN", "indexing service unavailable"));
        }
        let episodes = result.episode_ids();
        if Self::scripted(&self.stall_indexing, container_tag) {
            on_progress(IndexingProgress {
                completed_ids: episodes[..1].to_vec(),
                failed_ids: vec![],
                total: episodes.len(),
            });
            return Err(ProviderError::provider("INDEX_STALLED", "indexing stopped progressing"));
        }
        for settled in 1..=episodes.len() {
            on_progress(IndexingProgress {
                completed_ids: episodes[..settled].to_vec(),
                failed_ids: vec![],
                total: episodes.len(),
            });
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        Ok(vec![json!({
            "id": format!("{}/s1", options.container_tag),
            "session_id": "s1",
            "content": format!("user: the answer to '{query}' is Oslo"),
        })])
    }

    async fn clear(&self, _container_tag: &str) -> Result<(), ProviderError> {
        self.calls.clear.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn collaborators(provider: impl Provider + 'static) -> Collaborators {
    Collaborators {
        provider: Box::new(provider),
        provider_config: serde_json::Value::Null,
        answer_model: Arc::new(ExtractiveAnswerModel),
        judge: Arc::new(ContainmentJudge),
    }
}

pub fn backend() -> Arc<dyn CheckpointBackend> {
    Arc::new(SqliteCheckpointBackend::in_memory().unwrap())
}

/// SQLite backend that refuses to store in-flight indexing progress.
pub struct ProgressRejectingBackend {
    inner: SqliteCheckpointBackend,
}

impl ProgressRejectingBackend {
    pub fn new() -> Self {
        Self {
            inner: SqliteCheckpointBackend::in_memory().unwrap(),
        }
    }
}

impl CheckpointBackend for ProgressRejectingBackend {
    fn load(&self, run_id: &RunId) -> StateResult<Option<RunCheckpoint>> {
        self.inner.load(run_id)
    }

    fn save(&self, checkpoint: &RunCheckpoint) -> StateResult<()> {
        let progress_write = checkpoint.questions.values().any(|q| {
            let indexing = q.phase(Phase::Indexing);
            indexing.status == PhaseStatus::InProgress && indexing.payload.is_some()
        });
        if progress_write {
            return Err(StateError::Io(std::io::Error::other("disk full")));
        }
        self.inner.save(checkpoint)
    }

    fn list_runs(&self) -> StateResult<Vec<RunId>> {
        self.inner.list_runs()
    }
}

/// Question with `sessions` one-line haystack sessions; the first holds
/// the evidence.
pub fn question(id: &str, sessions: usize) -> Question {
    Question {
        question_id: QuestionId::new(id),
        question: "Which city did I move to?".into(),
        question_type: "single-session-user".into(),
        answer: "Oslo".into(),
        question_date: Some("2023/05/30".into()),
        haystack_sessions: (1..=sessions)
            .map(|n| Session {
                session_id: format!("s{n}"),
                date: Some("2023/05/01".into()),
                messages: vec![Message {
                    role: "user".into(),
                    content: if n == 1 {
                        "I decided to move to Oslo next month".into()
                    } else {
                        format!("Small talk number {n} about the weather")
                    },
                }],
            })
            .collect(),
        answer_session_ids: vec!["s1".into()],
    }
}

pub fn request(run_id: &str, questions: Vec<Question>) -> RunRequest {
    RunRequest::new(RunId::new(run_id), questions)
}

pub fn ids(names: &[&str]) -> Vec<QuestionId> {
    names.iter().map(|n| QuestionId::new(*n)).collect()
}
