//! Indexing: wait until the provider has indexed every ingested episode.
//!
//! Unlike the other phases, a provider failure here halts the run: the
//! remaining questions would be searched against partially indexed data.
//! Progress callbacks persist the partial id sets first and only then update
//! the shared progress display.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use memorybench_state::StateError;
use memorybench_types::checkpoint::{IndexingProgress, IngestResult, PhasePatch, PhasePayload};
use memorybench_types::phase::Phase;
use memorybench_types::state::QuestionId;

use super::{record_item, summarize, work_items, PhaseContext, PhaseSummary};
use crate::error::PipelineError;
use crate::executor::execute;
use crate::progress::{EpisodeCounts, ProgressAggregator};

struct IndexItem {
    id: QuestionId,
    container_tag: String,
    ingest: IngestResult,
}

pub(super) async fn run(ctx: &Arc<PhaseContext>) -> Result<PhaseSummary, PipelineError> {
    let phase = Phase::Indexing;
    let started = Instant::now();
    let items = work_items(ctx, phase)?;
    if items.is_empty() {
        tracing::info!(phase = phase.as_str(), "Nothing to do");
        return Ok(PhaseSummary::skipped(phase));
    }
    let eligible = items.len();

    let mut aggregator = ProgressAggregator::new(phase.as_str());
    let mut pending = Vec::with_capacity(eligible);
    let mut shortcut = 0usize;
    for item in items {
        let ingest = match ctx.payload_of(&item.id, Phase::Ingest)? {
            PhasePayload::Ingest(result) => result,
            _ => IngestResult::default(),
        };
        let episodes = ingest.episode_count();
        aggregator.register(&item.id, episodes);

        if episodes == 0 {
            // Nothing to wait for; never touch the provider.
            ctx.store
                .update_phase(&item.id, phase, PhasePatch::in_progress(Utc::now()))?;
            ctx.store.update_phase(
                &item.id,
                phase,
                PhasePatch::completed(PhasePayload::Indexing(IndexingProgress::empty()), Utc::now(), 0),
            )?;
            aggregator.mark_done(&item.id);
            shortcut += 1;
            continue;
        }
        pending.push(IndexItem {
            id: item.id,
            container_tag: item.container_tag,
            ingest,
        });
    }

    let concurrency = ctx.concurrency(phase);
    tracing::info!(
        phase = phase.as_str(),
        eligible,
        zero_episode = shortcut,
        concurrency,
        "Phase started"
    );
    if let Some(line) = aggregator.render_if_changed() {
        tracing::info!(phase = phase.as_str(), "{line}");
    }

    let aggregator = Arc::new(Mutex::new(aggregator));
    let shared = Arc::clone(ctx);
    let results = execute(pending, concurrency, &ctx.stop, phase, move |item: IndexItem| {
        let ctx = Arc::clone(&shared);
        let aggregator = Arc::clone(&aggregator);
        async move {
            let id = item.id.clone();
            let unit = await_item(&ctx, &aggregator, item);
            let result = record_item(&ctx, phase, id.clone(), unit).await;
            settle(&aggregator, &id, result.is_ok());
            result
        }
    })
    .await?;

    let mut summary = summarize(phase, eligible, concurrency, started, &results);
    summary.completed += shortcut;
    Ok(summary)
}

async fn await_item(
    ctx: &PhaseContext,
    aggregator: &Mutex<ProgressAggregator>,
    item: IndexItem,
) -> Result<PhasePayload, PipelineError> {
    let persist_error: Mutex<Option<StateError>> = Mutex::new(None);

    let on_progress = |progress: IndexingProgress| {
        let counts = EpisodeCounts {
            completed: progress.completed_ids.len(),
            failed: progress.failed_ids.len(),
            total: progress.total,
        };
        if let Err(e) = ctx.store.update_phase(
            &item.id,
            Phase::Indexing,
            PhasePatch::progress(PhasePayload::Indexing(progress)),
        ) {
            if let Ok(mut slot) = persist_error.lock() {
                slot.get_or_insert(e);
            }
            return;
        }
        if let Ok(mut agg) = aggregator.lock() {
            agg.update(&item.id, counts);
            if let Some(line) = agg.render_if_changed() {
                tracing::info!(phase = "indexing", "{line}");
            }
        }
    };

    let outcome = ctx
        .provider
        .await_indexing(&item.ingest, &item.container_tag, &on_progress)
        .await;

    if let Some(e) = persist_error.lock().ok().and_then(|mut slot| slot.take()) {
        return Err(PipelineError::Persistence(e));
    }

    match outcome {
        Ok(()) => {
            let last = ctx
                .store
                .read(|cp| {
                    cp.question(&item.id)
                        .and_then(|q| q.phase(Phase::Indexing).indexing_progress().cloned())
                })?;
            Ok(PhasePayload::Indexing(finalize(last, item.ingest.episode_ids())))
        }
        Err(e) => Err(PipelineError::PhaseFatal {
            phase: Phase::Indexing,
            run_id: ctx.run_id().clone(),
            question_id: item.id,
            message: e.to_string(),
        }),
    }
}

/// Final progress once the provider reports indexing finished.
///
/// Episodes the provider never reported on are counted as completed.
fn finalize(last: Option<IndexingProgress>, episodes: &[String]) -> IndexingProgress {
    let mut progress = last.unwrap_or_default();
    let settled: BTreeSet<&str> = progress
        .completed_ids
        .iter()
        .chain(&progress.failed_ids)
        .map(String::as_str)
        .collect();
    let unreported: Vec<String> = episodes
        .iter()
        .filter(|e| !settled.contains(e.as_str()))
        .cloned()
        .collect();
    progress.completed_ids.extend(unreported);
    progress.total = episodes.len();
    progress
}

fn settle(aggregator: &Mutex<ProgressAggregator>, id: &QuestionId, ok: bool) {
    if let Ok(mut agg) = aggregator.lock() {
        if ok {
            agg.mark_done(id);
        } else {
            agg.mark_failed(id);
        }
        if let Some(line) = agg.render_if_changed() {
            tracing::info!(phase = "indexing", "{line}");
        }
    }
}
