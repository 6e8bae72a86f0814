//! Run report: status counts, latency, accuracy and retrieval quality
//! derived from a run checkpoint.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use memorybench_state::{ArtifactDir, StateError};
use memorybench_types::checkpoint::{PhaseStatus, RunCheckpoint, StatusCounts};
use memorybench_types::dataset::Question;
use memorybench_types::phase::Phase;
use memorybench_types::state::{QuestionId, RunId};
use serde::{Deserialize, Serialize};

pub const REPORT_FILE: &str = "report.json";

const UNKNOWN_TYPE: &str = "unknown";

/// Latency of completed items in one phase, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

impl LatencyStats {
    /// `None` for an empty sample. Percentiles use the nearest-rank method.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_samples(mut samples: Vec<u64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        let count = samples.len();
        let sum: u128 = samples.iter().map(|v| u128::from(*v)).sum();
        Some(Self {
            count,
            mean_ms: sum as f64 / count as f64,
            p50_ms: nearest_rank(&samples, 50),
            p95_ms: nearest_rank(&samples, 95),
            max_ms: samples[count - 1],
        })
    }
}

fn nearest_rank(sorted: &[u64], percentile: usize) -> u64 {
    let rank = (percentile * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub counts: StatusCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyStats>,
}

/// Judge verdicts over a set of questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub evaluated: usize,
    pub correct: usize,
    /// `correct / evaluated`, `0.0` when nothing was evaluated.
    pub accuracy: f64,
}

impl Accuracy {
    fn add(&mut self, correct: bool) {
        self.evaluated += 1;
        if correct {
            self.correct += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(mut self) -> Self {
        if self.evaluated > 0 {
            self.accuracy = self.correct as f64 / self.evaluated as f64;
        }
        self
    }
}

/// Aggregate retrieval quality over questions with evidence sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    pub scored: usize,
    pub hit_rate: f64,
    pub mean_recall: f64,
    pub mrr: f64,
}

/// One question left `failed` in some phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub question_id: QuestionId,
    pub phase: Phase,
    pub error: String,
}

/// Summary of one run, written as `report.json` next to the answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub provider: String,
    pub generated_at: DateTime<Utc>,
    pub questions: usize,
    pub complete: bool,
    pub phases: Vec<PhaseReport>,
    pub accuracy: Accuracy,
    pub accuracy_by_type: BTreeMap<String, Accuracy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalSummary>,
    #[serde(default)]
    pub failures: Vec<FailureEntry>,
}

impl RunReport {
    /// Build the report for `checkpoint`; `questions` supplies question types.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn build(
        checkpoint: &RunCheckpoint,
        questions: &BTreeMap<QuestionId, Question>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let phases = Phase::ALL
            .iter()
            .map(|&phase| PhaseReport {
                phase,
                counts: checkpoint.status_counts(phase),
                latency: LatencyStats::from_samples(
                    checkpoint
                        .questions
                        .values()
                        .map(|q| q.phase(phase))
                        .filter(|s| s.status == PhaseStatus::Completed)
                        .filter_map(|s| s.duration_ms)
                        .collect(),
                ),
            })
            .collect();

        let mut accuracy = Accuracy::default();
        let mut by_type: BTreeMap<String, Accuracy> = BTreeMap::new();
        let mut retrieval = Vec::new();
        let mut failures = Vec::new();

        for q in checkpoint.questions.values() {
            for &phase in &Phase::ALL {
                let state = q.phase(phase);
                if state.status == PhaseStatus::Failed {
                    failures.push(FailureEntry {
                        question_id: q.question_id.clone(),
                        phase,
                        error: state.error.clone().unwrap_or_default(),
                    });
                }
            }

            let evaluate = q.phase(Phase::Evaluate);
            if evaluate.status != PhaseStatus::Completed {
                continue;
            }
            let Some(evaluation) = evaluate.evaluation() else {
                continue;
            };
            accuracy.add(evaluation.correct);
            let question_type = questions
                .get(&q.question_id)
                .map_or(UNKNOWN_TYPE, |question| question.question_type.as_str());
            by_type
                .entry(question_type.to_string())
                .or_default()
                .add(evaluation.correct);
            if let Some(score) = evaluation.retrieval {
                retrieval.push(score);
            }
        }

        let retrieval = (!retrieval.is_empty()).then(|| {
            let n = retrieval.len() as f64;
            RetrievalSummary {
                scored: retrieval.len(),
                hit_rate: retrieval.iter().filter(|s| s.hit).count() as f64 / n,
                mean_recall: retrieval.iter().map(|s| s.recall).sum::<f64>() / n,
                mrr: retrieval.iter().map(|s| s.reciprocal_rank).sum::<f64>() / n,
            }
        });

        Self {
            run_id: checkpoint.run_id.clone(),
            provider: checkpoint.provider.clone(),
            generated_at,
            questions: checkpoint.questions.len(),
            complete: checkpoint.is_complete(),
            phases,
            accuracy: accuracy.finish(),
            accuracy_by_type: by_type
                .into_iter()
                .map(|(kind, acc)| (kind, acc.finish()))
                .collect(),
            retrieval,
            failures,
        }
    }

    /// Write `report.json` into the run's artifact directory.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O or encoding failure.
    pub fn write(&self, artifacts: &ArtifactDir) -> Result<PathBuf, StateError> {
        artifacts.write_json(REPORT_FILE, self)
    }

    /// Plain-text rendering for the terminal.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} ({}): {} questions{}",
            self.run_id,
            self.provider,
            self.questions,
            if self.complete { ", complete" } else { "" }
        );
        let _ = writeln!(
            out,
            "  {:<10} {:>8} {:>11} {:>9} {:>6} {:>9} {:>9} {:>9}",
            "phase", "pending", "in_progress", "completed", "failed", "p50_ms", "p95_ms", "max_ms"
        );
        for p in &self.phases {
            let (p50, p95, max) = p.latency.map_or_else(
                || ("-".to_string(), "-".to_string(), "-".to_string()),
                |l| (l.p50_ms.to_string(), l.p95_ms.to_string(), l.max_ms.to_string()),
            );
            let _ = writeln!(
                out,
                "  {:<10} {:>8} {:>11} {:>9} {:>6} {:>9} {:>9} {:>9}",
                p.phase.as_str(),
                p.counts.pending,
                p.counts.in_progress,
                p.counts.completed,
                p.counts.failed,
                p50,
                p95,
                max
            );
        }
        let _ = writeln!(
            out,
            "Accuracy: {}/{} ({:.1}%)",
            self.accuracy.correct,
            self.accuracy.evaluated,
            self.accuracy.accuracy * 100.0
        );
        for (kind, acc) in &self.accuracy_by_type {
            let _ = writeln!(
                out,
                "  {kind}: {}/{} ({:.1}%)",
                acc.correct,
                acc.evaluated,
                acc.accuracy * 100.0
            );
        }
        if let Some(r) = &self.retrieval {
            let _ = writeln!(
                out,
                "Retrieval ({} scored): hit rate {:.3}, recall {:.3}, MRR {:.3}",
                r.scored, r.hit_rate, r.mean_recall, r.mrr
            );
        }
        if !self.failures.is_empty() {
            let _ = writeln!(out, "Failures:");
            for f in &self.failures {
                let _ = writeln!(out, "  {} [{}]: {}", f.question_id, f.phase, f.error);
            }
        }
        out
    }
}
