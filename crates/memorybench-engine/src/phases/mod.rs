//! Phase runners.
//!
//! Every runner has the same shape: select eligible questions from the
//! checkpoint, resolve the phase's worker count, and run one unit of work per
//! question through the bounded executor. A unit of work marks its phase
//! `in_progress`, calls the collaborator, then marks it `completed` or
//! `failed`, persisting after each step.

mod answer;
mod evaluate;
mod indexing;
mod ingest;
mod search;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use memorybench_state::{AnswerStore, CheckpointStore};
use memorybench_types::checkpoint::{PhasePatch, PhasePayload, PhaseStatus, RunCheckpoint};
use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::dataset::Question;
use memorybench_types::phase::Phase;
use memorybench_types::state::{QuestionId, RunId};
use serde::{Deserialize, Serialize};

use crate::concurrency::resolve_concurrency;
use crate::error::PipelineError;
use crate::executor::{execute, StopSignal};
use crate::model::{AnswerModel, Judge};
use crate::provider::Provider;

/// Everything a phase runner needs, shared by all of a run's workers.
pub struct PhaseContext {
    pub store: Arc<CheckpointStore>,
    pub provider: Arc<dyn Provider>,
    pub answer_model: Arc<dyn AnswerModel>,
    pub judge: Arc<dyn Judge>,
    pub answers: Arc<AnswerStore>,
    pub questions: Arc<BTreeMap<QuestionId, Question>>,
    /// Run-level worker counts (config or CLI).
    pub run_concurrency: Option<ConcurrencyOverrides>,
    /// Restrict every phase to these questions.
    pub filter: Option<BTreeSet<QuestionId>>,
    pub search_limit: usize,
    pub max_retries: u32,
    pub stop: StopSignal,
}

impl PhaseContext {
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        self.store.run_id()
    }

    #[must_use]
    pub fn concurrency(&self, phase: Phase) -> usize {
        resolve_concurrency(
            phase,
            self.run_concurrency.as_ref(),
            Some(&self.provider.concurrency()),
        )
    }

    pub(crate) fn question(&self, id: &QuestionId) -> Result<&Question, PipelineError> {
        self.questions.get(id).ok_or_else(|| {
            PipelineError::Infrastructure(anyhow::anyhow!(
                "question '{id}' is in the checkpoint but not in the dataset"
            ))
        })
    }

    /// Payload another phase of `id` completed with.
    pub(crate) fn payload_of(
        &self,
        id: &QuestionId,
        phase: Phase,
    ) -> Result<PhasePayload, PipelineError> {
        self.store
            .read(|cp| {
                cp.question(id)
                    .and_then(|q| q.phase(phase).payload.clone())
            })?
            .ok_or_else(|| {
                PipelineError::Infrastructure(anyhow::anyhow!(
                    "question '{id}' has no {phase} result in the checkpoint"
                ))
            })
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub eligible: usize,
    pub completed: usize,
    pub failed: usize,
    pub concurrency: usize,
    pub duration_secs: f64,
}

impl PhaseSummary {
    fn skipped(phase: Phase) -> Self {
        Self {
            phase,
            eligible: 0,
            completed: 0,
            failed: 0,
            concurrency: 0,
            duration_secs: 0.0,
        }
    }
}

/// Per-item timing returned by a successful unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTiming {
    pub question_id: QuestionId,
    pub duration_ms: u64,
}

/// One eligible question, as seen when the phase started.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub(crate) id: QuestionId,
    pub(crate) container_tag: String,
    pub(crate) prior: PhaseStatus,
}

/// Questions the phase should process.
///
/// A question is eligible when its previous phase is `completed` (ingest has
/// none) and this phase is not. `in_progress` is eligible: at startup it can
/// only be left over from an interrupted run.
#[must_use]
pub fn eligible_questions(
    checkpoint: &RunCheckpoint,
    phase: Phase,
    filter: Option<&BTreeSet<QuestionId>>,
) -> Vec<QuestionId> {
    checkpoint
        .questions
        .values()
        .filter(|q| filter.map_or(true, |ids| ids.contains(&q.question_id)))
        .filter(|q| {
            phase
                .previous()
                .map_or(true, |prev| q.phase(prev).status == PhaseStatus::Completed)
        })
        .filter(|q| q.phase(phase).status.needs_work())
        .map(|q| q.question_id.clone())
        .collect()
}

/// Run one phase to completion (or to its first fatal error).
///
/// # Errors
///
/// Returns the first fatal [`PipelineError`]; recoverable item failures are
/// counted in the summary instead.
pub async fn run_phase(
    ctx: &Arc<PhaseContext>,
    phase: Phase,
) -> Result<PhaseSummary, PipelineError> {
    match phase {
        Phase::Ingest => run_items(ctx, phase, ingest::ingest_item).await,
        Phase::Indexing => indexing::run(ctx).await,
        Phase::Search => run_items(ctx, phase, search::search_item).await,
        Phase::Answer => run_items(ctx, phase, answer::answer_item).await,
        Phase::Evaluate => run_items(ctx, phase, evaluate::evaluate_item).await,
    }
}

pub(crate) fn work_items(
    ctx: &PhaseContext,
    phase: Phase,
) -> Result<Vec<WorkItem>, PipelineError> {
    Ok(ctx.store.read(|cp| {
        eligible_questions(cp, phase, ctx.filter.as_ref())
            .into_iter()
            .filter_map(|id| {
                cp.question(&id).map(|q| WorkItem {
                    container_tag: q.container_tag.clone(),
                    prior: q.phase(phase).status,
                    id,
                })
            })
            .collect()
    })?)
}

/// Generic runner for phases whose work is one collaborator call per item.
async fn run_items<F, Fut>(
    ctx: &Arc<PhaseContext>,
    phase: Phase,
    work: F,
) -> Result<PhaseSummary, PipelineError>
where
    F: Fn(Arc<PhaseContext>, WorkItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PhasePayload, PipelineError>> + Send + 'static,
{
    let started = Instant::now();
    let items = work_items(ctx, phase)?;
    if items.is_empty() {
        tracing::info!(phase = phase.as_str(), "Nothing to do");
        return Ok(PhaseSummary::skipped(phase));
    }

    let eligible = items.len();
    let concurrency = ctx.concurrency(phase);
    tracing::info!(
        phase = phase.as_str(),
        eligible,
        concurrency,
        "Phase started"
    );

    let shared = Arc::clone(ctx);
    let results = execute(items, concurrency, &ctx.stop, phase, move |item: WorkItem| {
        let ctx = Arc::clone(&shared);
        let unit = work(Arc::clone(&ctx), item.clone());
        async move { record_item(&ctx, phase, item.id, unit).await }
    })
    .await?;

    Ok(summarize(phase, eligible, concurrency, started, &results))
}

/// Wrap one unit of work with its checkpoint bookkeeping.
pub(crate) async fn record_item<Fut>(
    ctx: &PhaseContext,
    phase: Phase,
    id: QuestionId,
    unit: Fut,
) -> Result<ItemTiming, PipelineError>
where
    Fut: Future<Output = Result<PhasePayload, PipelineError>>,
{
    let started = Instant::now();
    ctx.store
        .update_phase(&id, phase, PhasePatch::in_progress(Utc::now()))?;

    let outcome = unit.await;
    let duration_ms = elapsed_ms(started);

    match outcome {
        Ok(payload) => {
            ctx.store.update_phase(
                &id,
                phase,
                PhasePatch::completed(payload, Utc::now(), duration_ms),
            )?;
            Ok(ItemTiming {
                question_id: id,
                duration_ms,
            })
        }
        Err(error) => {
            if !matches!(error, PipelineError::Persistence(_)) {
                let marked = ctx.store.update_phase(
                    &id,
                    phase,
                    PhasePatch::failed(item_message(&error), Utc::now(), duration_ms),
                );
                if let Err(e) = marked {
                    if !error.is_fatal() {
                        return Err(e.into());
                    }
                    tracing::warn!(
                        phase = phase.as_str(),
                        question_id = id.as_str(),
                        error = %e,
                        "Could not record failure of halting item"
                    );
                }
            }
            if !error.is_fatal() {
                tracing::warn!(
                    phase = phase.as_str(),
                    question_id = id.as_str(),
                    duration_ms,
                    error = %error,
                    "Item failed"
                );
            }
            Err(error)
        }
    }
}

/// Message stored in the checkpoint for a failed item.
fn item_message(error: &PipelineError) -> String {
    match error {
        PipelineError::PhaseFatal { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn summarize(
    phase: Phase,
    eligible: usize,
    concurrency: usize,
    started: Instant,
    results: &[Result<ItemTiming, PipelineError>],
) -> PhaseSummary {
    let completed = results.iter().filter(|r| r.is_ok()).count();
    let summary = PhaseSummary {
        phase,
        eligible,
        completed,
        failed: results.len() - completed,
        concurrency,
        duration_secs: started.elapsed().as_secs_f64(),
    };
    tracing::info!(
        phase = phase.as_str(),
        eligible = summary.eligible,
        completed = summary.completed,
        failed = summary.failed,
        duration_secs = summary.duration_secs,
        "Phase finished"
    );
    summary
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
