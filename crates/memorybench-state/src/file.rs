//! JSON-file implementation of [`CheckpointBackend`].
//!
//! One `<run_id>.json` document per run inside a directory. Writes go to a
//! sibling temp file that is then renamed over the target, so a crash never
//! leaves a truncated checkpoint behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use memorybench_types::checkpoint::RunCheckpoint;
use memorybench_types::state::RunId;

use crate::backend::CheckpointBackend;
use crate::error::{self, StateError};

const CHECKPOINT_EXT: &str = "json";

/// Directory of per-run JSON checkpoint documents.
pub struct FileCheckpointBackend {
    dir: PathBuf,
}

impl FileCheckpointBackend {
    /// Use (and create if needed) `dir` for checkpoint documents.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`](crate::error::StateError::Io) if the
    /// directory can't be created.
    pub fn open(dir: impl Into<PathBuf>) -> error::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the document for `run_id`.
    #[must_use]
    pub fn document_path(&self, run_id: &RunId) -> PathBuf {
        self.dir
            .join(format!("{}.{CHECKPOINT_EXT}", file_stem(run_id.as_str())))
    }
}

/// Run ids are operator-supplied; keep them inside the directory.
///
/// Percent-encodes every byte outside `[A-Za-z0-9_-]` (and a `.` only when
/// it is not the first character), so distinct run ids never share a stem.
pub(crate) fn file_stem(run_id: &str) -> String {
    let mut stem = String::with_capacity(run_id.len());
    for (idx, byte) in run_id.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'_')
            || (byte == b'.' && idx > 0);
        if keep {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

/// Write `bytes` to `path` through a temp file + rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> error::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl CheckpointBackend for FileCheckpointBackend {
    fn load(&self, run_id: &RunId) -> error::Result<Option<RunCheckpoint>> {
        let path = self.document_path(run_id);
        match fs::read(&path) {
            Ok(bytes) => {
                let checkpoint: RunCheckpoint = serde_json::from_slice(&bytes)?;
                if checkpoint.run_id != *run_id {
                    return Err(StateError::RunIdMismatch {
                        requested: run_id.clone(),
                        stored: checkpoint.run_id,
                    });
                }
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, checkpoint: &RunCheckpoint) -> error::Result<()> {
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(&self.document_path(&checkpoint.run_id), &bytes)
    }

    fn list_runs(&self) -> error::Result<Vec<RunId>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CHECKPOINT_EXT) {
                continue;
            }
            let bytes = fs::read(&path)?;
            match serde_json::from_slice::<RunCheckpoint>(&bytes) {
                Ok(checkpoint) => runs.push(checkpoint.run_id),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable checkpoint document"
                    );
                }
            }
        }
        runs.sort();
        Ok(runs)
    }
}
