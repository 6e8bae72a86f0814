//! Per-run output artifacts.
//!
//! Artifacts live under `<output_dir>/<run_id>/`; nothing is written to a
//! fixed location. [`AnswerStore`] accumulates generated answers in memory
//! and merges them into `answers.json` on an explicit [`AnswerStore::flush`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use memorybench_types::state::{QuestionId, RunId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{self, StateError};
use crate::file::{file_stem, write_atomic};

const ANSWERS_FILE: &str = "answers.json";

/// Output directory for one run's artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    #[must_use]
    pub fn new(output_dir: &Path, run_id: &RunId) -> Self {
        Self {
            root: output_dir.join(file_stem(run_id.as_str())),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Serialize `value` as pretty JSON into `name`, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on encoding or I/O failure.
    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> error::Result<PathBuf> {
        let path = self.path(name);
        write_atomic(&path, &serde_json::to_vec_pretty(value)?)?;
        Ok(path)
    }

    /// Read a JSON artifact, `Ok(None)` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on decoding or I/O failure.
    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> error::Result<Option<T>> {
        match std::fs::read(self.path(name)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// One generated answer, as written to `answers.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub question_type: String,
    pub question: String,
    pub ground_truth: String,
    pub hypothesis: String,
    pub recorded_at: DateTime<Utc>,
}

/// Run-scoped accumulator of generated answers.
///
/// Owned by the run driver; workers call [`AnswerStore::record`] and the
/// driver decides when to [`AnswerStore::flush`].
pub struct AnswerStore {
    artifacts: ArtifactDir,
    pending: Mutex<BTreeMap<QuestionId, AnswerRecord>>,
}

impl AnswerStore {
    #[must_use]
    pub fn new(artifacts: ArtifactDir) -> Self {
        Self {
            artifacts,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, BTreeMap<QuestionId, AnswerRecord>>> {
        self.pending.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Buffer an answer; a later record for the same question replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::LockPoisoned`] if a writer panicked.
    pub fn record(&self, record: AnswerRecord) -> error::Result<()> {
        self.lock()?.insert(record.question_id.clone(), record);
        Ok(())
    }

    /// Merge buffered answers into `answers.json` and clear the buffer.
    ///
    /// Answers already on disk from earlier invocations of the same run are
    /// kept unless replaced. Returns the number of answers written this call.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O or encoding failure; the buffer is kept
    /// so a later flush can retry.
    pub fn flush(&self) -> error::Result<usize> {
        let mut pending = self.lock()?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut merged: BTreeMap<QuestionId, AnswerRecord> = self
            .artifacts
            .read_json::<Vec<AnswerRecord>>(ANSWERS_FILE)?
            .unwrap_or_default()
            .into_iter()
            .map(|r| (r.question_id.clone(), r))
            .collect();
        let written = pending.len();
        for (id, record) in pending.iter() {
            merged.insert(id.clone(), record.clone());
        }

        let records: Vec<&AnswerRecord> = merged.values().collect();
        let path = self.artifacts.write_json(ANSWERS_FILE, &records)?;
        pending.clear();

        tracing::info!(
            path = %path.display(),
            written,
            total = records.len(),
            "Flushed answers"
        );
        Ok(written)
    }

    /// All answers on disk for this run.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O or decoding failure.
    pub fn load_flushed(&self) -> error::Result<Vec<AnswerRecord>> {
        Ok(self
            .artifacts
            .read_json::<Vec<AnswerRecord>>(ANSWERS_FILE)?
            .unwrap_or_default())
    }
}
