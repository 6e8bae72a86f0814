//! Checkpoint backend trait definition.
//!
//! [`CheckpointBackend`] defines the storage contract for run checkpoints:
//! one structured document per run id, read and replaced as a whole. Model
//! types live in [`memorybench_types::checkpoint`].

use memorybench_types::checkpoint::RunCheckpoint;
use memorybench_types::state::RunId;

use crate::error;

/// Storage contract for run checkpoints.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn CheckpointBackend>`, and `save` must replace the stored document
/// atomically: a reader observes either the previous or the new document,
/// never a mix.
pub trait CheckpointBackend: Send + Sync {
    /// Read the checkpoint for a run.
    ///
    /// Returns `Ok(None)` when no checkpoint has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage or
    /// decoding failure.
    fn load(&self, run_id: &RunId) -> error::Result<Option<RunCheckpoint>>;

    /// Replace the stored checkpoint for `checkpoint.run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn save(&self, checkpoint: &RunCheckpoint) -> error::Result<()>;

    /// Run ids with a stored checkpoint, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_runs(&self) -> error::Result<Vec<RunId>>;
}
