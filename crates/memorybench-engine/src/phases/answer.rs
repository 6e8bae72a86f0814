//! Answer: build the provider's prompt and ask the answer model.

use std::sync::Arc;

use chrono::Utc;
use memorybench_state::AnswerRecord;
use memorybench_types::checkpoint::{AnswerOutput, PhasePayload};
use memorybench_types::phase::Phase;

use super::{PhaseContext, WorkItem};
use crate::error::{call_with_retries, PipelineError};

pub(super) async fn answer_item(
    ctx: Arc<PhaseContext>,
    item: WorkItem,
) -> Result<PhasePayload, PipelineError> {
    let question = ctx.question(&item.id)?;
    let results = match ctx.payload_of(&item.id, Phase::Search)? {
        PhasePayload::Search(output) => output.results,
        _ => Vec::new(),
    };

    let prompt = ctx.provider.answer_prompt(question, &results);
    let hypothesis = call_with_retries(ctx.max_retries, Phase::Answer, &item.id, || {
        ctx.answer_model.answer(&prompt, question)
    })
    .await
    .map_err(PipelineError::Model)?;

    ctx.answers.record(AnswerRecord {
        question_id: item.id.clone(),
        question_type: question.question_type.clone(),
        question: question.question.clone(),
        ground_truth: question.answer.clone(),
        hypothesis: hypothesis.clone(),
        recorded_at: Utc::now(),
    })?;

    Ok(PhasePayload::Answer(AnswerOutput { hypothesis }))
}
