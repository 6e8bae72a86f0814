//! Ingest: hand each question's haystack sessions to the provider.

use std::sync::Arc;

use memorybench_types::checkpoint::{PhasePayload, PhaseStatus};
use memorybench_types::phase::Phase;

use super::{PhaseContext, WorkItem};
use crate::error::{call_with_retries, PipelineError};
use crate::provider::IngestOptions;

pub(super) async fn ingest_item(
    ctx: Arc<PhaseContext>,
    item: WorkItem,
) -> Result<PhasePayload, PipelineError> {
    let question = ctx.question(&item.id)?;

    // A previous attempt may have stored part of the haystack.
    if matches!(item.prior, PhaseStatus::InProgress | PhaseStatus::Failed) {
        tracing::debug!(
            question_id = item.id.as_str(),
            container_tag = item.container_tag.as_str(),
            "Clearing container before re-ingest"
        );
        ctx.provider
            .clear(&item.container_tag)
            .await
            .map_err(PipelineError::Provider)?;
    }

    let options = IngestOptions {
        container_tag: item.container_tag.clone(),
        question_date: question.question_date.clone(),
    };
    let result = call_with_retries(ctx.max_retries, Phase::Ingest, &item.id, || {
        ctx.provider.ingest(&question.haystack_sessions, &options)
    })
    .await
    .map_err(PipelineError::Provider)?;

    tracing::debug!(
        question_id = item.id.as_str(),
        documents = result.document_ids.len(),
        tasks = result.task_ids.len(),
        "Ingested"
    );
    Ok(PhasePayload::Ingest(result))
}
