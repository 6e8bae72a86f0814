//! Per-run checkpoint document.
//!
//! A [`RunCheckpoint`] records, for every question of a run, the state of
//! each pipeline [`Phase`]. It is the unit the checkpoint store persists:
//! every write replaces the whole document.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::concurrency::ConcurrencyOverrides;
use crate::phase::Phase;
use crate::state::{container_tag, QuestionId, RunId};

// ---------------------------------------------------------------------------
// Phase status
// ---------------------------------------------------------------------------

/// Lifecycle status of one phase for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PhaseStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the phase still has work to do.
    ///
    /// `InProgress` counts as outstanding: a status found at startup cannot
    /// be trusted after a crash.
    #[must_use]
    pub fn needs_work(self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Whether `self -> next` is an allowed forward transition.
    #[must_use]
    pub fn can_transition_to(self, next: PhaseStatus) -> bool {
        match next {
            Self::Pending => false,
            Self::InProgress => matches!(self, Self::Pending | Self::Failed | Self::InProgress),
            Self::Completed | Self::Failed => matches!(self, Self::Pending | Self::InProgress),
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Phase payloads
// ---------------------------------------------------------------------------

/// What a provider returned from ingesting one question's sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

impl IngestResult {
    /// Episode ids the indexing phase waits on.
    ///
    /// Providers that hand back asynchronous task ids are tracked by task;
    /// all others by document.
    #[must_use]
    pub fn episode_ids(&self) -> &[String] {
        if self.task_ids.is_empty() {
            &self.document_ids
        } else {
            &self.task_ids
        }
    }

    #[must_use]
    pub fn episode_count(&self) -> usize {
        self.episode_ids().len()
    }
}

/// Cumulative indexing progress for one question.
///
/// Providers always report the full sets seen so far, never deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingProgress {
    #[serde(default)]
    pub completed_ids: Vec<String>,
    #[serde(default)]
    pub failed_ids: Vec<String>,
    pub total: usize,
}

impl IndexingProgress {
    /// Progress for an item with nothing to index.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of episodes that reached a terminal state.
    #[must_use]
    pub fn settled(&self) -> usize {
        self.completed_ids.len() + self.failed_ids.len()
    }
}

/// Raw provider search results, kept opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutput {
    pub results: Vec<serde_json::Value>,
    pub result_count: usize,
}

impl SearchOutput {
    #[must_use]
    pub fn new(results: Vec<serde_json::Value>) -> Self {
        let result_count = results.len();
        Self {
            results,
            result_count,
        }
    }
}

/// Generated answer for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOutput {
    pub hypothesis: String,
}

/// Retrieval quality for one question's search results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalScore {
    /// At least one evidence session appeared in the results.
    pub hit: bool,
    /// Fraction of evidence sessions that appeared in the results.
    pub recall: f64,
    /// `1 / rank` of the first evidence hit, `0.0` when none.
    pub reciprocal_rank: f64,
}

/// Judge verdict for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub correct: bool,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalScore>,
}

/// Phase-specific result carried by a [`PhaseState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhasePayload {
    Ingest(IngestResult),
    Indexing(IndexingProgress),
    Search(SearchOutput),
    Answer(AnswerOutput),
    Evaluate(Evaluation),
}

// ---------------------------------------------------------------------------
// Phase state
// ---------------------------------------------------------------------------

/// Rejected status change on a [`PhaseState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid phase transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PhaseStatus,
    pub to: PhaseStatus,
}

/// State of one phase for one question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PhasePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseState {
    /// Merge a partial update into this state.
    ///
    /// A patch without a status only updates the payload of an
    /// `InProgress` phase (incremental progress).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the status change is not a forward
    /// transition, or if a payload-only patch targets a phase that is not
    /// running.
    pub fn apply(&mut self, patch: PhasePatch) -> Result<(), InvalidTransition> {
        match patch.status {
            Some(next) => {
                if !self.status.can_transition_to(next) {
                    return Err(InvalidTransition {
                        from: self.status,
                        to: next,
                    });
                }
                if next == PhaseStatus::InProgress {
                    self.completed_at = None;
                    self.duration_ms = None;
                    self.error = None;
                }
                self.status = next;
            }
            None if self.status != PhaseStatus::InProgress => {
                return Err(InvalidTransition {
                    from: self.status,
                    to: self.status,
                });
            }
            None => {}
        }

        if let Some(started_at) = patch.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(duration_ms) = patch.duration_ms {
            self.duration_ms = Some(duration_ms);
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(payload) = patch.payload {
            self.payload = Some(payload);
        }
        Ok(())
    }

    #[must_use]
    pub fn ingest_result(&self) -> Option<&IngestResult> {
        match &self.payload {
            Some(PhasePayload::Ingest(result)) => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub fn indexing_progress(&self) -> Option<&IndexingProgress> {
        match &self.payload {
            Some(PhasePayload::Indexing(progress)) => Some(progress),
            _ => None,
        }
    }

    #[must_use]
    pub fn answer_output(&self) -> Option<&AnswerOutput> {
        match &self.payload {
            Some(PhasePayload::Answer(output)) => Some(output),
            _ => None,
        }
    }

    #[must_use]
    pub fn evaluation(&self) -> Option<&Evaluation> {
        match &self.payload {
            Some(PhasePayload::Evaluate(evaluation)) => Some(evaluation),
            _ => None,
        }
    }
}

/// Partial update merged into a [`PhaseState`] by the checkpoint store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhasePatch {
    pub status: Option<PhaseStatus>,
    pub payload: Option<PhasePayload>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl PhasePatch {
    /// Mark the phase running, starting now.
    #[must_use]
    pub fn in_progress(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(PhaseStatus::InProgress),
            started_at: Some(now),
            ..Self::default()
        }
    }

    /// Mark the phase completed with its result.
    #[must_use]
    pub fn completed(payload: PhasePayload, now: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            status: Some(PhaseStatus::Completed),
            payload: Some(payload),
            completed_at: Some(now),
            duration_ms: Some(duration_ms),
            ..Self::default()
        }
    }

    /// Mark the phase failed with an operator-facing message.
    #[must_use]
    pub fn failed(error: impl Into<String>, now: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            status: Some(PhaseStatus::Failed),
            completed_at: Some(now),
            duration_ms: Some(duration_ms),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Replace the payload of a running phase without changing its status.
    #[must_use]
    pub fn progress(payload: PhasePayload) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Question + run checkpoints
// ---------------------------------------------------------------------------

/// One [`PhaseState`] per pipeline phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStates {
    #[serde(default)]
    pub ingest: PhaseState,
    #[serde(default)]
    pub indexing: PhaseState,
    #[serde(default)]
    pub search: PhaseState,
    #[serde(default)]
    pub answer: PhaseState,
    #[serde(default)]
    pub evaluate: PhaseState,
}

impl PhaseStates {
    #[must_use]
    pub fn get(&self, phase: Phase) -> &PhaseState {
        match phase {
            Phase::Ingest => &self.ingest,
            Phase::Indexing => &self.indexing,
            Phase::Search => &self.search,
            Phase::Answer => &self.answer,
            Phase::Evaluate => &self.evaluate,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhaseState {
        match phase {
            Phase::Ingest => &mut self.ingest,
            Phase::Indexing => &mut self.indexing,
            Phase::Search => &mut self.search,
            Phase::Answer => &mut self.answer,
            Phase::Evaluate => &mut self.evaluate,
        }
    }
}

/// Checkpoint of one question across all phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionCheckpoint {
    pub question_id: QuestionId,
    pub container_tag: String,
    #[serde(default)]
    pub phases: PhaseStates,
}

impl QuestionCheckpoint {
    /// Fresh checkpoint with every phase `Pending`.
    #[must_use]
    pub fn new(question_id: QuestionId, run_id: &RunId) -> Self {
        Self {
            container_tag: container_tag(&question_id, run_id),
            question_id,
            phases: PhaseStates::default(),
        }
    }

    #[must_use]
    pub fn phase(&self, phase: Phase) -> &PhaseState {
        self.phases.get(phase)
    }
}

/// Count of questions per status for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }
}

/// Root checkpoint document for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub run_id: RunId,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<ConcurrencyOverrides>,
    #[serde(default)]
    pub questions: BTreeMap<QuestionId, QuestionCheckpoint>,
}

impl RunCheckpoint {
    /// New checkpoint with one all-`Pending` entry per question.
    ///
    /// Duplicate ids collapse into a single entry.
    #[must_use]
    pub fn new(
        run_id: RunId,
        provider: impl Into<String>,
        question_ids: impl IntoIterator<Item = QuestionId>,
        concurrency: Option<ConcurrencyOverrides>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let questions = question_ids
            .into_iter()
            .map(|id| (id.clone(), QuestionCheckpoint::new(id, &run_id)))
            .collect();
        Self {
            run_id,
            provider: provider.into(),
            created_at,
            concurrency,
            questions,
        }
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&QuestionCheckpoint> {
        self.questions.get(id)
    }

    /// Per-status counts for one phase.
    #[must_use]
    pub fn status_counts(&self, phase: Phase) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for question in self.questions.values() {
            match question.phase(phase).status {
                PhaseStatus::Pending => counts.pending += 1,
                PhaseStatus::InProgress => counts.in_progress += 1,
                PhaseStatus::Completed => counts.completed += 1,
                PhaseStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Every phase of every question is `Completed`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.questions.values().all(|q| {
            Phase::ALL
                .iter()
                .all(|p| q.phase(*p).status == PhaseStatus::Completed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn transition_table() {
        use PhaseStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Failed.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn in_progress_clears_previous_failure() {
        let mut state = PhaseState::default();
        state.apply(PhasePatch::in_progress(ts())).unwrap();
        state.apply(PhasePatch::failed("boom", ts(), 12)).unwrap();
        assert_eq!(state.error.as_deref(), Some("boom"));

        state.apply(PhasePatch::in_progress(ts())).unwrap();
        assert_eq!(state.status, PhaseStatus::InProgress);
        assert!(state.error.is_none());
        assert!(state.duration_ms.is_none());
    }

    #[test]
    fn completed_is_terminal() {
        let mut state = PhaseState::default();
        state
            .apply(PhasePatch::completed(
                PhasePayload::Answer(AnswerOutput {
                    hypothesis: "Paris".into(),
                }),
                ts(),
                5,
            ))
            .unwrap();
        let err = state.apply(PhasePatch::in_progress(ts())).unwrap_err();
        assert_eq!(err.from, PhaseStatus::Completed);
        assert_eq!(state.answer_output().unwrap().hypothesis, "Paris");
    }

    #[test]
    fn progress_patch_requires_running_phase() {
        let mut state = PhaseState::default();
        let patch = PhasePatch::progress(PhasePayload::Indexing(IndexingProgress {
            completed_ids: vec!["a".into()],
            failed_ids: vec![],
            total: 2,
        }));
        assert!(state.apply(patch.clone()).is_err());

        state.apply(PhasePatch::in_progress(ts())).unwrap();
        state.apply(patch).unwrap();
        assert_eq!(state.indexing_progress().unwrap().settled(), 1);
        assert_eq!(state.status, PhaseStatus::InProgress);
    }

    #[test]
    fn episodes_prefer_task_ids() {
        let docs_only = IngestResult {
            document_ids: vec!["d1".into(), "d2".into()],
            task_ids: vec![],
        };
        assert_eq!(docs_only.episode_count(), 2);

        let with_tasks = IngestResult {
            document_ids: vec!["d1".into(), "d2".into()],
            task_ids: vec!["t1".into()],
        };
        assert_eq!(with_tasks.episode_ids(), &["t1".to_string()]);
    }

    #[test]
    fn new_run_checkpoint_is_all_pending() {
        let cp = RunCheckpoint::new(
            RunId::new("r1"),
            "in_memory",
            ["q1", "q2", "q1"].map(QuestionId::new),
            None,
            ts(),
        );
        assert_eq!(cp.questions.len(), 2);
        for phase in Phase::ALL {
            assert_eq!(cp.status_counts(phase).pending, 2);
        }
        assert_eq!(cp.question(&QuestionId::new("q2")).unwrap().container_tag, "q2-r1");
        assert!(!cp.is_complete());
    }

    #[test]
    fn checkpoint_json_shape_is_stable() {
        let mut cp = RunCheckpoint::new(
            RunId::new("r1"),
            "in_memory",
            [QuestionId::new("q1")],
            None,
            ts(),
        );
        let q = cp.questions.get_mut(&QuestionId::new("q1")).unwrap();
        q.phases
            .get_mut(Phase::Ingest)
            .apply(PhasePatch::completed(
                PhasePayload::Ingest(IngestResult {
                    document_ids: vec!["doc-1".into()],
                    task_ids: vec![],
                }),
                ts(),
                3,
            ))
            .unwrap();

        let value = serde_json::to_value(&cp).unwrap();
        let ingest = &value["questions"]["q1"]["phases"]["ingest"];
        assert_eq!(ingest["status"], "completed");
        assert_eq!(ingest["payload"]["kind"], "ingest");
        assert_eq!(ingest["payload"]["document_ids"][0], "doc-1");
        assert_eq!(value["questions"]["q1"]["phases"]["search"]["status"], "pending");

        let back: RunCheckpoint = serde_json::from_value(value).unwrap();
        assert_eq!(back, cp);
    }
}
