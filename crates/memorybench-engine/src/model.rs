//! Answer generation and judging collaborators.
//!
//! [`AnswerModel`] turns a provider-built prompt into a hypothesis and
//! [`Judge`] scores that hypothesis against the ground truth. Both are
//! selected by `kind` in the benchmark config.

use std::collections::BTreeSet;

use async_trait::async_trait;
use memorybench_types::checkpoint::{Evaluation, RetrievalScore};
use memorybench_types::dataset::Question;
use memorybench_types::error::ProviderError;

use crate::text::{normalize, terms};

const UNKNOWN_ANSWER: &str = "I don't know.";
const CONTEXT_MARKER: &str = "Memories:";
const QUESTION_MARKER: &str = "Question:";

/// Produces a hypothesis answer from a prompt.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    fn name(&self) -> &str;

    async fn answer(&self, prompt: &str, question: &Question) -> Result<String, ProviderError>;
}

/// Scores a hypothesis against a question's ground truth.
#[async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        question: &Question,
        hypothesis: &str,
        results: &[serde_json::Value],
    ) -> Result<Evaluation, ProviderError>;
}

// ---------------------------------------------------------------------------
// Extractive answer model
// ---------------------------------------------------------------------------

/// Answers with the retrieved line that best overlaps the question.
///
/// Reads the context block of the prompt, so it works with any provider whose
/// prompt keeps one memory per line between `Memories:` and `Question:`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveAnswerModel;

impl ExtractiveAnswerModel {
    pub const KIND: &'static str = "extractive";
}

#[async_trait]
impl AnswerModel for ExtractiveAnswerModel {
    fn name(&self) -> &str {
        Self::KIND
    }

    async fn answer(&self, prompt: &str, question: &Question) -> Result<String, ProviderError> {
        let context = prompt
            .split_once(CONTEXT_MARKER)
            .map_or(prompt, |(_, rest)| rest);
        let context = context
            .rsplit_once(QUESTION_MARKER)
            .map_or(context, |(head, _)| head);

        let wanted = terms(&question.question);
        let best = context
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| (terms(line).intersection(&wanted).count(), line))
            .filter(|(overlap, _)| *overlap > 0)
            // First line wins ties: retrieval rank order.
            .fold(None::<(usize, &str)>, |best, candidate| match best {
                Some(b) if b.0 >= candidate.0 => Some(b),
                _ => Some(candidate),
            });

        Ok(best.map_or_else(|| UNKNOWN_ANSWER.to_string(), |(_, line)| strip_rank(line)))
    }
}

/// `"[3] user: text"` → `"user: text"`.
fn strip_rank(line: &str) -> String {
    match line.strip_prefix('[').and_then(|rest| rest.split_once("] ")) {
        Some((rank, text)) if rank.chars().all(|c| c.is_ascii_digit()) => text.to_string(),
        _ => line.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Containment judge
// ---------------------------------------------------------------------------

/// Correct when the normalized hypothesis contains the normalized ground
/// truth. Also scores evidence retrieval when the question names its
/// evidence sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainmentJudge;

impl ContainmentJudge {
    pub const KIND: &'static str = "containment";
}

#[async_trait]
impl Judge for ContainmentJudge {
    fn name(&self) -> &str {
        Self::KIND
    }

    async fn evaluate(
        &self,
        question: &Question,
        hypothesis: &str,
        results: &[serde_json::Value],
    ) -> Result<Evaluation, ProviderError> {
        let truth = normalize(&question.answer);
        if truth.is_empty() {
            return Err(ProviderError::data(
                "EMPTY_GROUND_TRUTH",
                format!("question '{}' has no ground-truth answer", question.question_id),
            ));
        }
        let correct = normalize(hypothesis).contains(&truth);

        Ok(Evaluation {
            correct,
            score: if correct { 1.0 } else { 0.0 },
            explanation: Some(if correct {
                "hypothesis contains the ground truth".to_string()
            } else {
                format!("expected '{}'", question.answer)
            }),
            retrieval: score_retrieval(&question.answer_session_ids, results),
        })
    }
}

/// Retrieval quality of `results` against the evidence sessions.
///
/// `None` when the question names no evidence. Results are matched by their
/// `session_id` field; ranks are 1-based.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score_retrieval(
    evidence: &[String],
    results: &[serde_json::Value],
) -> Option<RetrievalScore> {
    let evidence: BTreeSet<&str> = evidence.iter().map(String::as_str).collect();
    if evidence.is_empty() {
        return None;
    }

    let mut found = BTreeSet::new();
    let mut first_rank = None;
    for (idx, result) in results.iter().enumerate() {
        let Some(session) = result.get("session_id").and_then(serde_json::Value::as_str) else {
            continue;
        };
        if evidence.contains(session) {
            found.insert(session);
            first_rank.get_or_insert(idx + 1);
        }
    }

    Some(RetrievalScore {
        hit: !found.is_empty(),
        recall: found.len() as f64 / evidence.len() as f64,
        reciprocal_rank: first_rank.map_or(0.0, |rank| 1.0 / rank as f64),
    })
}

/// Build an answer model for a config `kind`.
///
/// # Errors
///
/// Returns a config [`ProviderError`] for unknown kinds.
pub fn create_answer_model(kind: &str) -> Result<Box<dyn AnswerModel>, ProviderError> {
    match kind {
        ExtractiveAnswerModel::KIND => Ok(Box::new(ExtractiveAnswerModel)),
        other => Err(ProviderError::config(
            "UNKNOWN_ANSWER_MODEL",
            format!(
                "unknown answer model kind '{other}' (available: {})",
                ExtractiveAnswerModel::KIND
            ),
        )),
    }
}

/// Build a judge for a config `kind`.
///
/// # Errors
///
/// Returns a config [`ProviderError`] for unknown kinds.
pub fn create_judge(kind: &str) -> Result<Box<dyn Judge>, ProviderError> {
    match kind {
        ContainmentJudge::KIND => Ok(Box::new(ContainmentJudge)),
        other => Err(ProviderError::config(
            "UNKNOWN_JUDGE",
            format!("unknown judge kind '{other}' (available: {})", ContainmentJudge::KIND),
        )),
    }
}
