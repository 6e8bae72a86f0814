//! Run driver: loads or creates the run checkpoint, then drives the phase
//! runners in order over the requested phase window.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use memorybench_state::{AnswerStore, ArtifactDir, CheckpointBackend, CheckpointStore};
use memorybench_types::checkpoint::RunCheckpoint;
use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::dataset::Question;
use memorybench_types::phase::Phase;
use memorybench_types::state::{QuestionId, RunId};

use crate::dataset::index_questions;
use crate::error::PipelineError;
use crate::executor::StopSignal;
use crate::model::{AnswerModel, Judge};
use crate::phases::{run_phase, PhaseContext, PhaseSummary};
use crate::provider::Provider;

/// Inclusive range of phases a run invocation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseWindow {
    pub from: Phase,
    pub to: Phase,
}

impl Default for PhaseWindow {
    fn default() -> Self {
        Self {
            from: Phase::Ingest,
            to: Phase::Evaluate,
        }
    }
}

impl PhaseWindow {
    /// Window from optional bounds; missing bounds default to the ends.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Infrastructure`] when `from` comes after `to`.
    pub fn new(from: Option<Phase>, to: Option<Phase>) -> Result<Self, PipelineError> {
        let window = Self {
            from: from.unwrap_or(Phase::Ingest),
            to: to.unwrap_or(Phase::Evaluate),
        };
        if window.from > window.to {
            return Err(PipelineError::Infrastructure(anyhow::anyhow!(
                "--from-phase {} comes after --to-phase {}",
                window.from,
                window.to
            )));
        }
        Ok(window)
    }

    #[must_use]
    pub fn contains(&self, phase: Phase) -> bool {
        self.from <= phase && phase <= self.to
    }

    pub fn phases(&self) -> impl Iterator<Item = Phase> + '_ {
        Phase::ALL.into_iter().filter(|p| self.contains(*p))
    }
}

/// The pluggable parts of a run.
pub struct Collaborators {
    /// Uninitialized; the driver calls `initialize` only if there is work.
    pub provider: Box<dyn Provider>,
    pub provider_config: serde_json::Value,
    pub answer_model: Arc<dyn AnswerModel>,
    pub judge: Arc<dyn Judge>,
}

/// What to run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub questions: Vec<Question>,
    /// Restrict processing to these question ids.
    pub filter: Option<BTreeSet<QuestionId>>,
    pub window: PhaseWindow,
    /// Run-level worker counts. `None` keeps what the checkpoint recorded.
    pub concurrency: Option<ConcurrencyOverrides>,
    pub search_limit: usize,
    pub max_retries: u32,
}

impl RunRequest {
    #[must_use]
    pub fn new(run_id: RunId, questions: Vec<Question>) -> Self {
        Self {
            run_id,
            questions,
            filter: None,
            window: PhaseWindow::default(),
            concurrency: None,
            search_limit: 10,
            max_retries: 2,
        }
    }
}

/// Result of a run invocation that did not halt.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub summaries: Vec<PhaseSummary>,
    pub checkpoint: RunCheckpoint,
    pub answers_flushed: usize,
    pub duration_secs: f64,
}

/// Run (or resume) a benchmark.
///
/// Creates the checkpoint for `request.run_id` if it does not exist, then
/// runs every phase of the window in order. Completed phases are never
/// redone, so invoking this on a finished run makes no provider calls.
///
/// # Errors
///
/// Returns the first fatal [`PipelineError`]. Buffered answers are flushed
/// before returning and the checkpoint stays resumable.
pub async fn run_benchmark(
    backend: Arc<dyn CheckpointBackend>,
    artifacts: ArtifactDir,
    collaborators: Collaborators,
    request: RunRequest,
    stop: StopSignal,
) -> Result<RunOutcome, PipelineError> {
    let started = Instant::now();
    let RunRequest {
        run_id,
        questions,
        filter,
        window,
        concurrency,
        search_limit,
        max_retries,
    } = request;
    let Collaborators {
        mut provider,
        provider_config,
        answer_model,
        judge,
    } = collaborators;
    let questions = index_questions(questions);

    let store = CheckpointStore::create(
        backend,
        &run_id,
        provider.name(),
        questions.keys().cloned(),
        concurrency,
    )?;
    check_run_matches(&store, provider.name(), &questions, filter.as_ref())?;

    let run_concurrency = match concurrency {
        Some(overrides) => {
            store.set_concurrency(Some(overrides))?;
            Some(overrides)
        }
        None => store.read(|cp| cp.concurrency)?,
    };

    let answers = Arc::new(AnswerStore::new(artifacts));
    let outstanding = store.read(|cp| {
        cp.questions
            .values()
            .filter(|q| filter.as_ref().map_or(true, |ids| ids.contains(&q.question_id)))
            .any(|q| window.phases().any(|p| q.phase(p).status.needs_work()))
    })?;
    if !outstanding {
        tracing::info!(
            run_id = run_id.as_str(),
            from = window.from.as_str(),
            to = window.to.as_str(),
            "Nothing outstanding in phase window"
        );
        return Ok(RunOutcome {
            checkpoint: store.snapshot()?,
            run_id,
            summaries: Vec::new(),
            answers_flushed: 0,
            duration_secs: started.elapsed().as_secs_f64(),
        });
    }

    provider.initialize(&provider_config).await.map_err(|e| {
        PipelineError::Infrastructure(
            anyhow::Error::new(e).context(format!("Failed to initialize provider '{}'", provider.name())),
        )
    })?;

    tracing::info!(
        run_id = run_id.as_str(),
        provider = provider.name(),
        answer_model = answer_model.name(),
        judge = judge.name(),
        questions = questions.len(),
        from = window.from.as_str(),
        to = window.to.as_str(),
        "Starting run"
    );

    let ctx = Arc::new(PhaseContext {
        store: Arc::new(store),
        provider: Arc::from(provider),
        answer_model,
        judge,
        answers: Arc::clone(&answers),
        questions: Arc::new(questions),
        run_concurrency,
        filter,
        search_limit,
        max_retries,
        stop: stop.clone(),
    });

    let mut summaries = Vec::new();
    for phase in window.phases() {
        let result = if stop.is_stopped() {
            Err(PipelineError::Cancelled)
        } else {
            run_phase(&ctx, phase).await
        };
        match result {
            Ok(summary) => summaries.push(summary),
            Err(error) => {
                flush_answers(&answers);
                tracing::error!(
                    run_id = run_id.as_str(),
                    phase = phase.as_str(),
                    error = %error,
                    "Run halted"
                );
                return Err(error);
            }
        }
    }

    let answers_flushed = answers.flush()?;
    let checkpoint = ctx.store.snapshot()?;
    let duration_secs = started.elapsed().as_secs_f64();
    tracing::info!(
        run_id = run_id.as_str(),
        complete = checkpoint.is_complete(),
        answers_flushed,
        duration_secs,
        "Run finished"
    );
    Ok(RunOutcome {
        run_id,
        summaries,
        checkpoint,
        answers_flushed,
        duration_secs,
    })
}

/// Reject resuming a run against a different provider or dataset.
fn check_run_matches(
    store: &CheckpointStore,
    provider: &str,
    questions: &BTreeMap<QuestionId, Question>,
    filter: Option<&BTreeSet<QuestionId>>,
) -> Result<(), PipelineError> {
    store
        .read(|cp| {
            if cp.provider != provider {
                anyhow::bail!(
                    "run '{}' was started with provider '{}', not '{provider}'",
                    cp.run_id,
                    cp.provider
                );
            }
            let missing: Vec<&str> = cp
                .questions
                .keys()
                .filter(|id| !questions.contains_key(*id))
                .map(QuestionId::as_str)
                .collect();
            if !missing.is_empty() {
                anyhow::bail!(
                    "run '{}' has question(s) not in the dataset: {}",
                    cp.run_id,
                    missing.join(", ")
                );
            }
            let unknown: Vec<&str> = filter
                .into_iter()
                .flatten()
                .filter(|id| !cp.questions.contains_key(*id))
                .map(QuestionId::as_str)
                .collect();
            if !unknown.is_empty() {
                anyhow::bail!(
                    "run '{}' has no question(s): {}",
                    cp.run_id,
                    unknown.join(", ")
                );
            }
            Ok(())
        })?
        .map_err(PipelineError::Infrastructure)
}

fn flush_answers(answers: &AnswerStore) {
    if let Err(e) = answers.flush() {
        tracing::warn!(error = %e, "Could not flush answers after halt");
    }
}
