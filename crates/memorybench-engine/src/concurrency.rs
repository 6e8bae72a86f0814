//! Per-phase worker count resolution.

use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::phase::Phase;

/// Worker count used when neither the run nor the provider says anything.
pub const FALLBACK_CONCURRENCY: usize = 1;

/// Resolve the worker count for `phase`.
///
/// Priority, first set value wins:
/// 1. run per-phase override
/// 2. run blanket override
/// 3. provider per-phase default
/// 4. provider blanket default
/// 5. [`FALLBACK_CONCURRENCY`]
///
/// Zero values are treated as unset, so the result is always at least `1`.
#[must_use]
pub fn resolve_concurrency(
    phase: Phase,
    run_override: Option<&ConcurrencyOverrides>,
    provider_default: Option<&ConcurrencyOverrides>,
) -> usize {
    let chosen = run_override
        .and_then(|o| o.for_phase(phase).or_else(|| o.blanket()))
        .or_else(|| provider_default.and_then(|d| d.for_phase(phase).or_else(|| d.blanket())));

    chosen
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(FALLBACK_CONCURRENCY)
}
