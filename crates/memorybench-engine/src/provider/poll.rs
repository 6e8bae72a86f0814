//! Geometric backoff for indexing status polls.

use std::time::Duration;

const GROWTH_FACTOR: u32 = 2;

/// Poll delay that doubles after every poll, capped at `max`.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    next: Duration,
    max: Duration,
}

impl PollBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            next: initial,
            max: max.max(initial),
        }
    }

    /// Delay before the next poll.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(GROWTH_FACTOR).min(self.max);
        delay
    }

    /// Start over after observable progress.
    pub fn reset(&mut self, initial: Duration) {
        self.next = initial.max(Duration::from_millis(1)).min(self.max);
    }
}
