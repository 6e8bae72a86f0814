//! Property tests for worker count resolution and progress aggregation.

use memorybench_engine::concurrency::{resolve_concurrency, FALLBACK_CONCURRENCY};
use memorybench_engine::progress::{EpisodeCounts, ProgressAggregator};
use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::phase::Phase;
use memorybench_types::state::QuestionId;
use proptest::prelude::*;

fn overrides() -> impl Strategy<Value = ConcurrencyOverrides> {
    let value = proptest::option::of(0u32..64);
    (
        value.clone(),
        value.clone(),
        value.clone(),
        value.clone(),
        value.clone(),
        value,
    )
        .prop_map(|(default, ingest, indexing, search, answer, evaluate)| {
            ConcurrencyOverrides {
                default,
                ingest,
                indexing,
                search,
                answer,
                evaluate,
            }
        })
}

fn phase() -> impl Strategy<Value = Phase> {
    proptest::sample::select(Phase::ALL.to_vec())
}

proptest! {
    #[test]
    fn resolution_follows_the_cascade(
        phase in phase(),
        run in proptest::option::of(overrides()),
        provider in proptest::option::of(overrides()),
    ) {
        let resolved = resolve_concurrency(phase, run.as_ref(), provider.as_ref());
        prop_assert!(resolved >= 1);

        let expected = [
            run.and_then(|r| r.for_phase(phase)),
            run.and_then(|r| r.blanket()),
            provider.and_then(|p| p.for_phase(phase)),
            provider.and_then(|p| p.blanket()),
        ]
        .into_iter()
        .flatten()
        .next()
        .map_or(FALLBACK_CONCURRENCY, |v| v as usize);
        prop_assert_eq!(resolved, expected);
    }

    #[test]
    fn empty_run_override_is_transparent(phase in phase(), provider in overrides()) {
        prop_assert_eq!(
            resolve_concurrency(phase, Some(&ConcurrencyOverrides::default()), Some(&provider)),
            resolve_concurrency(phase, None, Some(&provider)),
        );
    }

    #[test]
    fn item_progress_never_regresses(
        total in 0usize..20,
        snapshots in proptest::collection::vec((0usize..25, 0usize..25), 0..30),
        finish_ok in any::<bool>(),
    ) {
        let id = QuestionId::new("q1");
        let mut agg = ProgressAggregator::new("indexing");
        agg.register(&id, total);

        let mut last = 0;
        for (completed, failed) in snapshots {
            agg.update(&id, EpisodeCounts { completed, failed, total });
            let now = agg.aggregated();
            let settled = now.completed + now.failed;
            prop_assert!(settled >= last, "settled went from {} to {}", last, settled);
            prop_assert!(settled <= total);
            last = settled;
        }

        if finish_ok {
            agg.mark_done(&id);
        } else {
            agg.mark_failed(&id);
        }
        let done = agg.aggregated();
        prop_assert_eq!(done.completed + done.failed, total);
        prop_assert_eq!(done.items_done, 1);

        // Updates after the item finished are ignored.
        agg.update(&id, EpisodeCounts { completed: 0, failed: 0, total });
        prop_assert_eq!(agg.aggregated(), done);
    }
}
