//! Checkpoint store error types.

use memorybench_types::checkpoint::InvalidTransition;
use memorybench_types::phase::Phase;
use memorybench_types::state::{QuestionId, RunId};

/// Errors produced by checkpoint backends and the checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `SQLite` failure annotated with the operation that hit it.
    #[error("sqlite error during {context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the checkpoint directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint document could not be encoded or decoded.
    #[error("checkpoint encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("checkpoint store lock poisoned")]
    LockPoisoned,

    /// Stored document belongs to a different run than the one requested.
    #[error("checkpoint for run '{requested}' holds run '{stored}'")]
    RunIdMismatch { requested: RunId, stored: RunId },

    /// Update addressed a question that is not part of the run.
    #[error("question '{question_id}' is not part of run '{run_id}'")]
    UnknownQuestion {
        run_id: RunId,
        question_id: QuestionId,
    },

    /// Update would move a phase backwards.
    #[error("question '{question_id}' phase {phase}: {source}")]
    Transition {
        question_id: QuestionId,
        phase: Phase,
        #[source]
        source: InvalidTransition,
    },
}

impl StateError {
    pub(crate) fn backend_context(context: &'static str, source: rusqlite::Error) -> Self {
        Self::Backend { context, source }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use memorybench_types::checkpoint::PhaseStatus;

    #[test]
    fn sqlite_error_displays_context() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("table not found".into()),
        );
        let err = StateError::backend_context("save_checkpoint: upsert", inner);
        let msg = err.to_string();
        assert!(msg.contains("save_checkpoint"), "got: {msg}");
    }

    #[test]
    fn lock_poisoned_displays() {
        let err = StateError::LockPoisoned;
        assert_eq!(err.to_string(), "checkpoint store lock poisoned");
    }

    #[test]
    fn transition_error_names_question_and_phase() {
        let err = StateError::Transition {
            question_id: QuestionId::new("q7"),
            phase: Phase::Indexing,
            source: InvalidTransition {
                from: PhaseStatus::Completed,
                to: PhaseStatus::InProgress,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("q7"));
        assert!(msg.contains("indexing"));
        assert!(msg.contains("completed -> in_progress"));
    }
}
