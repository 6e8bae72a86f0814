//! Benchmark dataset loading.
//!
//! A dataset is a JSON array of questions, or JSON Lines with one question
//! per line when the file ends in `.jsonl`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use memorybench_types::dataset::Question;
use memorybench_types::state::QuestionId;

/// Load and validate a dataset file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not decode, or holds
/// duplicate question ids.
pub fn load_dataset(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset file: {}", path.display()))?;
    let lines = path.extension().is_some_and(|ext| ext == "jsonl");
    let questions = parse_dataset_str(&content, lines)
        .with_context(|| format!("Invalid dataset file: {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        questions = questions.len(),
        "Loaded dataset"
    );
    Ok(questions)
}

/// Decode a dataset from a string.
///
/// # Errors
///
/// Returns an error on malformed JSON or duplicate question ids.
pub fn parse_dataset_str(content: &str, json_lines: bool) -> Result<Vec<Question>> {
    let questions: Vec<Question> = if json_lines {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse question on line {}", idx + 1))
            })
            .collect::<Result<_>>()?
    } else {
        serde_json::from_str(content).context("Failed to parse dataset JSON")?
    };

    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = questions
        .iter()
        .filter(|q| !seen.insert(&q.question_id))
        .map(|q| q.question_id.as_str())
        .collect();
    if !duplicates.is_empty() {
        bail!(
            "Duplicate question id(s) in dataset: {}",
            duplicates.into_iter().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(questions)
}

/// Index questions by id.
#[must_use]
pub fn index_questions(questions: Vec<Question>) -> BTreeMap<QuestionId, Question> {
    questions
        .into_iter()
        .map(|q| (q.question_id.clone(), q))
        .collect()
}
