//! Search: query the provider with each question.

use std::sync::Arc;

use memorybench_types::checkpoint::{PhasePayload, SearchOutput};
use memorybench_types::phase::Phase;

use super::{PhaseContext, WorkItem};
use crate::error::{call_with_retries, PipelineError};
use crate::provider::SearchOptions;

pub(super) async fn search_item(
    ctx: Arc<PhaseContext>,
    item: WorkItem,
) -> Result<PhasePayload, PipelineError> {
    let question = ctx.question(&item.id)?;
    let options = SearchOptions {
        container_tag: item.container_tag.clone(),
        limit: ctx.search_limit,
        question_date: question.question_date.clone(),
    };

    let results = call_with_retries(ctx.max_retries, Phase::Search, &item.id, || {
        ctx.provider.search(&question.question, &options)
    })
    .await
    .map_err(PipelineError::Provider)?;

    Ok(PhasePayload::Search(SearchOutput::new(results)))
}
