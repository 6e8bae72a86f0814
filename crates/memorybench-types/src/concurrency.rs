//! Per-phase worker count settings.
//!
//! The same shape serves both the run-level override (from the benchmark
//! config or CLI) and the provider-declared defaults.

use serde::{Deserialize, Serialize};

use crate::phase::Phase;

/// Optional worker counts: one blanket value plus per-phase values.
///
/// A `0` is treated the same as an absent value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcurrencyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluate: Option<u32>,
}

impl ConcurrencyOverrides {
    /// Blanket value applied to every phase.
    #[must_use]
    pub fn uniform(value: u32) -> Self {
        Self {
            default: Some(value),
            ..Self::default()
        }
    }

    /// Builder-style per-phase setter.
    #[must_use]
    pub fn with_phase(mut self, phase: Phase, value: u32) -> Self {
        *self.slot_mut(phase) = Some(value);
        self
    }

    /// Explicit per-phase value, ignoring the blanket default.
    #[must_use]
    pub fn for_phase(&self, phase: Phase) -> Option<u32> {
        let value = match phase {
            Phase::Ingest => self.ingest,
            Phase::Indexing => self.indexing,
            Phase::Search => self.search,
            Phase::Answer => self.answer,
            Phase::Evaluate => self.evaluate,
        };
        value.filter(|v| *v > 0)
    }

    /// Blanket value, if set.
    #[must_use]
    pub fn blanket(&self) -> Option<u32> {
        self.default.filter(|v| *v > 0)
    }

    /// No value set at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blanket().is_none() && Phase::ALL.iter().all(|p| self.for_phase(*p).is_none())
    }

    fn slot_mut(&mut self, phase: Phase) -> &mut Option<u32> {
        match phase {
            Phase::Ingest => &mut self.ingest,
            Phase::Indexing => &mut self.indexing,
            Phase::Search => &mut self.search,
            Phase::Answer => &mut self.answer,
            Phase::Evaluate => &mut self.evaluate,
        }
    }
}
