//! Aggregated episode progress across concurrently indexing items.

use std::collections::BTreeMap;

use memorybench_types::state::QuestionId;

/// Episode counts reported for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeCounts {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl EpisodeCounts {
    fn settled(&self) -> usize {
        self.completed + self.failed
    }
}

/// Totals across all registered items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatedProgress {
    pub items_done: usize,
    pub items_total: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
struct ItemProgress {
    counts: EpisodeCounts,
    done: bool,
}

/// Tracks per-item episode counts and renders a single progress line.
///
/// Updates are absolute snapshots. Counts are clamped to the item's total and
/// never move backwards, so a stale or out-of-order callback cannot make the
/// displayed progress regress.
#[derive(Debug)]
pub struct ProgressAggregator {
    label: String,
    items: BTreeMap<QuestionId, ItemProgress>,
    last_rendered: Option<String>,
}

impl ProgressAggregator {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            items: BTreeMap::new(),
            last_rendered: None,
        }
    }

    /// Record an item's precomputed episode total.
    pub fn register(&mut self, item: &QuestionId, total: usize) {
        let entry = self.items.entry(item.clone()).or_default();
        entry.counts.total = total;
    }

    /// Replace an item's counts with a new snapshot.
    ///
    /// Unknown items are registered with the snapshot's total.
    pub fn update(&mut self, item: &QuestionId, snapshot: EpisodeCounts) {
        let entry = self.items.entry(item.clone()).or_insert_with(|| ItemProgress {
            counts: EpisodeCounts {
                total: snapshot.total,
                ..EpisodeCounts::default()
            },
            done: false,
        });
        if entry.done {
            return;
        }

        let total = entry.counts.total;
        let completed = snapshot.completed.min(total);
        let failed = snapshot.failed.min(total - completed);
        let next = EpisodeCounts {
            completed: completed.max(entry.counts.completed),
            failed: failed.max(entry.counts.failed),
            total,
        };
        // Per-field max can overshoot when episodes move between buckets.
        if next.settled() <= total {
            entry.counts = next;
        } else if completed + failed >= entry.counts.settled() {
            entry.counts = EpisodeCounts {
                completed,
                failed,
                total,
            };
        }
    }

    /// Force-complete an item: every episode not failed counts as completed.
    pub fn mark_done(&mut self, item: &QuestionId) {
        if let Some(entry) = self.items.get_mut(item) {
            entry.counts.completed = entry.counts.total - entry.counts.failed.min(entry.counts.total);
            entry.done = true;
        }
    }

    /// Mark an item finished unsuccessfully: unsettled episodes count as failed.
    pub fn mark_failed(&mut self, item: &QuestionId) {
        if let Some(entry) = self.items.get_mut(item) {
            entry.counts.failed = entry.counts.total - entry.counts.completed.min(entry.counts.total);
            entry.done = true;
        }
    }

    #[must_use]
    pub fn aggregated(&self) -> AggregatedProgress {
        self.items
            .values()
            .fold(AggregatedProgress::default(), |mut acc, item| {
                acc.items_total += 1;
                if item.done {
                    acc.items_done += 1;
                }
                acc.completed += item.counts.completed;
                acc.failed += item.counts.failed;
                acc.total += item.counts.total;
                acc
            })
    }

    #[must_use]
    pub fn render(&self) -> String {
        let agg = self.aggregated();
        let line = format!(
            "{}: {}/{} items, {}/{} episodes",
            self.label, agg.items_done, agg.items_total, agg.completed, agg.total
        );
        if agg.failed > 0 {
            format!("{line}, {} failed", agg.failed)
        } else {
            line
        }
    }

    /// The rendered line, only if it changed since the last call.
    pub fn render_if_changed(&mut self) -> Option<String> {
        let line = self.render();
        if self.last_rendered.as_deref() == Some(line.as_str()) {
            return None;
        }
        self.last_rendered = Some(line.clone());
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str) -> QuestionId {
        QuestionId::new(id)
    }

    fn counts(completed: usize, failed: usize, total: usize) -> EpisodeCounts {
        EpisodeCounts {
            completed,
            failed,
            total,
        }
    }

    #[test]
    fn aggregates_across_items() {
        let mut agg = ProgressAggregator::new("indexing");
        agg.register(&q("a"), 4);
        agg.register(&q("b"), 6);
        agg.update(&q("a"), counts(2, 0, 4));
        agg.update(&q("b"), counts(3, 1, 6));

        assert_eq!(
            agg.aggregated(),
            AggregatedProgress {
                items_done: 0,
                items_total: 2,
                completed: 5,
                failed: 1,
                total: 10,
            }
        );
    }

    #[test]
    fn updates_are_clamped_to_item_total() {
        let mut agg = ProgressAggregator::new("indexing");
        agg.register(&q("a"), 3);
        agg.update(&q("a"), counts(10, 10, 99));
        let a = agg.aggregated();
        assert_eq!((a.completed, a.failed, a.total), (3, 0, 3));
    }

    #[test]
    fn stale_snapshot_does_not_regress() {
        let mut agg = ProgressAggregator::new("indexing");
        agg.register(&q("a"), 5);
        agg.update(&q("a"), counts(4, 0, 5));
        agg.update(&q("a"), counts(1, 0, 5));
        assert_eq!(agg.aggregated().completed, 4);
    }

    #[test]
    fn mark_done_and_failed_settle_items() {
        let mut agg = ProgressAggregator::new("indexing");
        agg.register(&q("a"), 5);
        agg.register(&q("b"), 5);
        agg.update(&q("a"), counts(2, 1, 5));
        agg.update(&q("b"), counts(2, 0, 5));
        agg.mark_done(&q("a"));
        agg.mark_failed(&q("b"));

        let a = agg.aggregated();
        assert_eq!(a.items_done, 2);
        assert_eq!(a.completed, 4 + 2);
        assert_eq!(a.failed, 1 + 3);

        // Late callbacks after an item settled are ignored.
        agg.update(&q("a"), counts(0, 0, 5));
        assert_eq!(agg.aggregated(), a);
    }

    #[test]
    fn renders_only_on_change() {
        let mut agg = ProgressAggregator::new("indexing");
        agg.register(&q("a"), 2);
        assert_eq!(
            agg.render_if_changed().as_deref(),
            Some("indexing: 0/1 items, 0/2 episodes")
        );
        assert!(agg.render_if_changed().is_none());
        agg.update(&q("a"), counts(1, 1, 2));
        assert_eq!(
            agg.render_if_changed().as_deref(),
            Some("indexing: 0/1 items, 1/2 episodes, 1 failed")
        );
        agg.update(&q("a"), counts(1, 1, 2));
        assert!(agg.render_if_changed().is_none());
    }
}
