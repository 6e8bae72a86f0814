//! Run checkpoint persistence for the memorybench engine.
//!
//! Provides the [`CheckpointBackend`] trait with `SQLite` and JSON-file
//! implementations, the [`CheckpointStore`] that serializes per-question
//! phase updates into whole-document writes, and the run artifact helpers
//! ([`ArtifactDir`], [`AnswerStore`]).

#![warn(clippy::pedantic)]

pub mod artifacts;
pub mod backend;
pub mod error;
pub mod file;
pub mod sqlite;
pub mod store;

pub use artifacts::{AnswerRecord, AnswerStore, ArtifactDir};
pub use backend::CheckpointBackend;
pub use error::StateError;
pub use file::FileCheckpointBackend;
pub use sqlite::SqliteCheckpointBackend;
pub use store::CheckpointStore;

/// Convenience re-exports for backend consumers.
pub mod prelude {
    pub use crate::backend::CheckpointBackend;
    pub use crate::file::FileCheckpointBackend;
    pub use crate::sqlite::SqliteCheckpointBackend;
    pub use crate::store::CheckpointStore;
    pub use memorybench_types::checkpoint::{PhasePatch, PhaseStatus, RunCheckpoint};
    pub use memorybench_types::phase::Phase;
    pub use memorybench_types::state::{QuestionId, RunId};
}
