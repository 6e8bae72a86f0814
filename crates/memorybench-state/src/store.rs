//! Serialized read/modify/persist access to one run's checkpoint.
//!
//! [`CheckpointStore`] owns the in-memory [`RunCheckpoint`] for a run and is
//! the only path through which workers mutate it. Every update is scoped to a
//! single `(question, phase)` leaf, merged under one lock, and persisted as a
//! whole document before the call returns.

use std::sync::{Arc, Mutex, MutexGuard};

use memorybench_types::checkpoint::{PhasePatch, RunCheckpoint};
use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::phase::Phase;
use memorybench_types::state::{QuestionId, RunId};

use crate::backend::CheckpointBackend;
use crate::error::{self, StateError};

/// Durable, serialized access to a run checkpoint.
pub struct CheckpointStore {
    backend: Arc<dyn CheckpointBackend>,
    run_id: RunId,
    checkpoint: Mutex<RunCheckpoint>,
}

impl CheckpointStore {
    /// Load an existing run.
    ///
    /// Returns `Ok(None)` when the run has never been checkpointed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on storage or decoding failure.
    pub fn load(backend: Arc<dyn CheckpointBackend>, run_id: &RunId) -> error::Result<Option<Self>> {
        Ok(backend
            .load(run_id)?
            .map(|checkpoint| Self::from_checkpoint(backend, checkpoint)))
    }

    /// Create the checkpoint for a run, every phase `Pending`.
    ///
    /// Idempotent: if a checkpoint for `run_id` already exists it is returned
    /// unchanged and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on storage failure.
    pub fn create(
        backend: Arc<dyn CheckpointBackend>,
        run_id: &RunId,
        provider: &str,
        question_ids: impl IntoIterator<Item = QuestionId>,
        concurrency: Option<ConcurrencyOverrides>,
    ) -> error::Result<Self> {
        if let Some(existing) = backend.load(run_id)? {
            tracing::info!(
                run_id = run_id.as_str(),
                questions = existing.questions.len(),
                "Resuming existing run checkpoint"
            );
            return Ok(Self::from_checkpoint(backend, existing));
        }

        let checkpoint = RunCheckpoint::new(
            run_id.clone(),
            provider,
            question_ids,
            concurrency,
            chrono::Utc::now(),
        );
        backend.save(&checkpoint)?;
        tracing::info!(
            run_id = run_id.as_str(),
            provider,
            questions = checkpoint.questions.len(),
            "Created run checkpoint"
        );
        Ok(Self::from_checkpoint(backend, checkpoint))
    }

    fn from_checkpoint(backend: Arc<dyn CheckpointBackend>, checkpoint: RunCheckpoint) -> Self {
        Self {
            backend,
            run_id: checkpoint.run_id.clone(),
            checkpoint: Mutex::new(checkpoint),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, RunCheckpoint>> {
        self.checkpoint.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Consistent copy of the current checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::LockPoisoned`] if a writer panicked.
    pub fn snapshot(&self) -> error::Result<RunCheckpoint> {
        Ok(self.lock()?.clone())
    }

    /// Run `f` against the current checkpoint without copying it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::LockPoisoned`] if a writer panicked.
    pub fn read<R>(&self, f: impl FnOnce(&RunCheckpoint) -> R) -> error::Result<R> {
        let guard = self.lock()?;
        Ok(f(&guard))
    }

    /// Merge `patch` into one question's phase state and persist the run.
    ///
    /// The in-memory document is only changed if the write succeeds, so a
    /// failed persist never leaves memory ahead of storage.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownQuestion`] or [`StateError::Transition`]
    /// for invalid updates, and any backend error from the persist step.
    pub fn update_phase(
        &self,
        question_id: &QuestionId,
        phase: Phase,
        patch: PhasePatch,
    ) -> error::Result<()> {
        let mut checkpoint = self.lock()?;
        let question = checkpoint
            .questions
            .get_mut(question_id)
            .ok_or_else(|| StateError::UnknownQuestion {
                run_id: self.run_id.clone(),
                question_id: question_id.clone(),
            })?;

        let slot = question.phases.get_mut(phase);
        let previous = slot.clone();
        slot.apply(patch).map_err(|source| StateError::Transition {
            question_id: question_id.clone(),
            phase,
            source,
        })?;
        let status = slot.status;

        if let Err(e) = self.backend.save(&checkpoint) {
            if let Some(question) = checkpoint.questions.get_mut(question_id) {
                *question.phases.get_mut(phase) = previous;
            }
            return Err(e);
        }

        tracing::debug!(
            run_id = self.run_id.as_str(),
            question_id = question_id.as_str(),
            phase = phase.as_str(),
            status = status.as_str(),
            "Checkpoint persisted"
        );
        Ok(())
    }

    /// Replace the run-level concurrency override and persist.
    ///
    /// # Errors
    ///
    /// Returns any backend error from the persist step.
    pub fn set_concurrency(&self, concurrency: Option<ConcurrencyOverrides>) -> error::Result<()> {
        let mut checkpoint = self.lock()?;
        if checkpoint.concurrency == concurrency {
            return Ok(());
        }
        let previous = std::mem::replace(&mut checkpoint.concurrency, concurrency);
        if let Err(e) = self.backend.save(&checkpoint) {
            checkpoint.concurrency = previous;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteCheckpointBackend;
    use chrono::Utc;
    use memorybench_types::checkpoint::{
        IngestResult, PhasePayload, PhaseStatus, RunCheckpoint,
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ids(names: &[&str]) -> Vec<QuestionId> {
        names.iter().map(|n| QuestionId::new(*n)).collect()
    }

    fn backend() -> Arc<dyn CheckpointBackend> {
        Arc::new(SqliteCheckpointBackend::in_memory().unwrap())
    }

    /// Backend whose writes can be switched to fail.
    struct FlakyBackend {
        inner: SqliteCheckpointBackend,
        fail: AtomicBool,
    }

    impl CheckpointBackend for FlakyBackend {
        fn load(&self, run_id: &RunId) -> error::Result<Option<RunCheckpoint>> {
            self.inner.load(run_id)
        }

        fn save(&self, checkpoint: &RunCheckpoint) -> error::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StateError::Io(std::io::Error::other("disk full")));
            }
            self.inner.save(checkpoint)
        }

        fn list_runs(&self) -> error::Result<Vec<RunId>> {
            self.inner.list_runs()
        }
    }

    #[test]
    fn create_is_idempotent() {
        let backend = backend();
        let run = RunId::new("r1");
        let store =
            CheckpointStore::create(backend.clone(), &run, "in_memory", ids(&["q1"]), None)
                .unwrap();
        store
            .update_phase(
                &QuestionId::new("q1"),
                Phase::Ingest,
                PhasePatch::in_progress(Utc::now()),
            )
            .unwrap();

        let again = CheckpointStore::create(
            backend,
            &run,
            "other",
            ids(&["q1", "q2", "q3"]),
            None,
        )
        .unwrap();
        let cp = again.snapshot().unwrap();
        assert_eq!(cp.provider, "in_memory");
        assert_eq!(cp.questions.len(), 1);
        assert_eq!(
            cp.questions[&QuestionId::new("q1")].phase(Phase::Ingest).status,
            PhaseStatus::InProgress
        );
    }

    #[test]
    fn load_missing_run_is_none() {
        assert!(CheckpointStore::load(backend(), &RunId::new("ghost"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn update_is_persisted_before_returning() {
        let backend = backend();
        let run = RunId::new("r1");
        let store =
            CheckpointStore::create(backend.clone(), &run, "in_memory", ids(&["q1", "q2"]), None)
                .unwrap();

        store
            .update_phase(
                &QuestionId::new("q2"),
                Phase::Ingest,
                PhasePatch::completed(
                    PhasePayload::Ingest(IngestResult {
                        document_ids: vec!["d1".into()],
                        task_ids: vec![],
                    }),
                    Utc::now(),
                    7,
                ),
            )
            .unwrap();

        let stored = backend.load(&run).unwrap().unwrap();
        let q2 = stored.questions[&QuestionId::new("q2")].phase(Phase::Ingest);
        assert_eq!(q2.status, PhaseStatus::Completed);
        assert_eq!(q2.duration_ms, Some(7));
        assert_eq!(q2.ingest_result().unwrap().document_ids, vec!["d1".to_string()]);
        assert_eq!(
            stored.questions[&QuestionId::new("q1")].phase(Phase::Ingest).status,
            PhaseStatus::Pending
        );
    }

    #[test]
    fn unknown_question_is_rejected() {
        let store =
            CheckpointStore::create(backend(), &RunId::new("r1"), "p", ids(&["q1"]), None).unwrap();
        let err = store
            .update_phase(
                &QuestionId::new("nope"),
                Phase::Search,
                PhasePatch::in_progress(Utc::now()),
            )
            .unwrap_err();
        assert!(matches!(err, StateError::UnknownQuestion { .. }));
    }

    #[test]
    fn backwards_transition_is_rejected() {
        let store =
            CheckpointStore::create(backend(), &RunId::new("r1"), "p", ids(&["q1"]), None).unwrap();
        let q1 = QuestionId::new("q1");
        store
            .update_phase(
                &q1,
                Phase::Answer,
                PhasePatch::completed(PhasePayload::Answer(Default::default()), Utc::now(), 1),
            )
            .unwrap();
        let err = store
            .update_phase(&q1, Phase::Answer, PhasePatch::in_progress(Utc::now()))
            .unwrap_err();
        assert!(matches!(err, StateError::Transition { phase: Phase::Answer, .. }));
    }

    #[test]
    fn failed_persist_leaves_memory_unchanged() {
        let flaky = Arc::new(FlakyBackend {
            inner: SqliteCheckpointBackend::in_memory().unwrap(),
            fail: AtomicBool::new(false),
        });
        let store = CheckpointStore::create(
            flaky.clone(),
            &RunId::new("r1"),
            "p",
            ids(&["q1"]),
            None,
        )
        .unwrap();

        flaky.fail.store(true, Ordering::SeqCst);
        let err = store
            .update_phase(
                &QuestionId::new("q1"),
                Phase::Ingest,
                PhasePatch::in_progress(Utc::now()),
            )
            .unwrap_err();
        assert!(matches!(err, StateError::Io(_)));

        let status = store
            .read(|cp| cp.questions[&QuestionId::new("q1")].phase(Phase::Ingest).status)
            .unwrap();
        assert_eq!(status, PhaseStatus::Pending);
    }

    #[test]
    fn concurrent_updates_to_different_leaves_all_land() {
        let backend = backend();
        let run = RunId::new("r1");
        let names: Vec<String> = (0..16).map(|i| format!("q{i}")).collect();
        let store = Arc::new(
            CheckpointStore::create(
                backend.clone(),
                &run,
                "p",
                names.iter().map(QuestionId::new),
                None,
            )
            .unwrap(),
        );

        let handles: Vec<_> = names
            .iter()
            .cloned()
            .map(|name| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let id = QuestionId::new(name);
                    store
                        .update_phase(&id, Phase::Ingest, PhasePatch::in_progress(Utc::now()))
                        .unwrap();
                    store
                        .update_phase(
                            &id,
                            Phase::Ingest,
                            PhasePatch::failed("timeout", Utc::now(), 3),
                        )
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = backend.load(&run).unwrap().unwrap();
        assert_eq!(stored.status_counts(Phase::Ingest).failed, 16);
    }
}
