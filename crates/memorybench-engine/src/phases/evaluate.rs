//! Evaluate: have the judge score each hypothesis.

use std::sync::Arc;

use memorybench_types::checkpoint::PhasePayload;
use memorybench_types::phase::Phase;

use super::{PhaseContext, WorkItem};
use crate::error::{call_with_retries, PipelineError};

pub(super) async fn evaluate_item(
    ctx: Arc<PhaseContext>,
    item: WorkItem,
) -> Result<PhasePayload, PipelineError> {
    let question = ctx.question(&item.id)?;
    let hypothesis = match ctx.payload_of(&item.id, Phase::Answer)? {
        PhasePayload::Answer(output) => output.hypothesis,
        _ => String::new(),
    };
    let results = match ctx.payload_of(&item.id, Phase::Search) {
        Ok(PhasePayload::Search(output)) => output.results,
        _ => Vec::new(),
    };

    let evaluation = call_with_retries(ctx.max_retries, Phase::Evaluate, &item.id, || {
        ctx.judge.evaluate(question, &hypothesis, &results)
    })
    .await
    .map_err(PipelineError::Model)?;

    tracing::debug!(
        question_id = item.id.as_str(),
        correct = evaluation.correct,
        "Evaluated"
    );
    Ok(PhasePayload::Evaluate(evaluation))
}
