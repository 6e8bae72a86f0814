//! Identifier newtypes shared by the checkpoint store and the engine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque run identifier chosen by the operator (or generated at run start).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Create a new run identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for RunId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Opaque question identifier from the benchmark dataset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    /// Create a new question identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for QuestionId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Container tags
// ---------------------------------------------------------------------------

/// Provider-side namespace for one question within one run.
///
/// Two runs against the same provider backend never share a container tag,
/// so clearing or searching one run's data cannot observe another's.
#[must_use]
pub fn container_tag(question: &QuestionId, run: &RunId) -> String {
    format!("{}-{}", question.as_str(), run.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_display_and_as_str() {
        let rid = RunId::new("run-2026-10-19");
        assert_eq!(rid.as_str(), "run-2026-10-19");
        assert_eq!(rid.to_string(), "run-2026-10-19");
    }

    #[test]
    fn question_id_eq_and_hash() {
        use std::collections::HashSet;
        let a = QuestionId::new("q1");
        let b = QuestionId::from("q1");
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn container_tag_isolates_runs() {
        let q = QuestionId::new("conv-7");
        let a = container_tag(&q, &RunId::new("a"));
        let b = container_tag(&q, &RunId::new("b"));
        assert_eq!(a, "conv-7-a");
        assert_ne!(a, b);
    }

    #[test]
    fn run_id_serde_transparent() {
        let rid = RunId::new("test");
        let json = serde_json::to_string(&rid).unwrap();
        assert_eq!(json, "\"test\"");
    }
}
