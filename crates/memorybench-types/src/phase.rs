//! Pipeline phases every question passes through, in order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One ordered stage of the benchmark pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ingest,
    Indexing,
    Search,
    Answer,
    Evaluate,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Ingest,
        Phase::Indexing,
        Phase::Search,
        Phase::Answer,
        Phase::Evaluate,
    ];

    /// Wire-format string for storage and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Indexing => "indexing",
            Self::Search => "search",
            Self::Answer => "answer",
            Self::Evaluate => "evaluate",
        }
    }

    /// The phase that must be `completed` before this one may start.
    #[must_use]
    pub fn previous(self) -> Option<Phase> {
        match self {
            Self::Ingest => None,
            Self::Indexing => Some(Self::Ingest),
            Self::Search => Some(Self::Indexing),
            Self::Answer => Some(Self::Search),
            Self::Evaluate => Some(Self::Answer),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown phase name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase '{0}', expected one of: ingest, indexing, search, answer, evaluate")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingest" => Ok(Self::Ingest),
            "indexing" | "index" => Ok(Self::Indexing),
            "search" => Ok(Self::Search),
            "answer" => Ok(Self::Answer),
            "evaluate" | "eval" => Ok(Self::Evaluate),
            _ => Err(UnknownPhase(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
    }

    #[test]
    fn previous_chains_back_to_ingest() {
        assert_eq!(Phase::Ingest.previous(), None);
        for pair in Phase::ALL.windows(2) {
            assert_eq!(pair[1].previous(), Some(pair[0]));
        }
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("Index".parse::<Phase>().unwrap(), Phase::Indexing);
        assert_eq!("eval".parse::<Phase>().unwrap(), Phase::Evaluate);
        assert!("rerank".parse::<Phase>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Phase::Indexing).unwrap();
        assert_eq!(json, "\"indexing\"");
    }
}
