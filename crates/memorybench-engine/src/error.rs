//! Pipeline error model and retry backoff policy helpers.

use std::future::Future;
use std::time::Duration;

use memorybench_state::StateError;
use memorybench_types::error::{ErrorCategory, ProviderError};
use memorybench_types::phase::Phase;
use memorybench_types::state::{QuestionId, RunId};

const BACKOFF_FAST_BASE_MS: u64 = 100;
const BACKOFF_NORMAL_BASE_MS: u64 = 1_000;
const BACKOFF_SLOW_BASE_MS: u64 = 5_000;
const BACKOFF_MAX_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// PipelineError : categorised errors for halt decisions
// ---------------------------------------------------------------------------

/// Categorized pipeline error.
///
/// `Provider` and `Model` are recoverable: they fail one item, the item is
/// marked `failed` in the checkpoint and the phase continues with the rest.
/// Every other variant is fatal and halts the run after in-flight work
/// drains.
#[derive(Debug)]
pub enum PipelineError {
    /// Typed memory provider error for one item.
    Provider(ProviderError),
    /// Typed answer model or judge error for one item.
    Model(ProviderError),
    /// A phase cannot safely continue past this item.
    PhaseFatal {
        phase: Phase,
        run_id: RunId,
        question_id: QuestionId,
        message: String,
    },
    /// Checkpoint or artifact persistence failed.
    Persistence(StateError),
    /// A stop was requested before the work completed.
    Cancelled,
    /// Infrastructure error (config, dataset, worker panic, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider(e) => write!(f, "{e}"),
            Self::Model(e) => write!(f, "model: {e}"),
            Self::PhaseFatal {
                phase,
                run_id,
                question_id,
                message,
            } => write!(
                f,
                "{phase} failed for question '{question_id}': {message}; \
                 fix the issue and resume with `--run-id {run_id}`"
            ),
            Self::Persistence(e) => write!(f, "checkpoint persistence failed: {e}"),
            Self::Cancelled => f.write_str("run cancelled"),
            Self::Infrastructure(e) => write!(f, "{e:#}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provider(e) | Self::Model(e) => Some(e),
            Self::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<StateError> for PipelineError {
    fn from(e: StateError) -> Self {
        Self::Persistence(e)
    }
}

impl From<ProviderError> for PipelineError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

impl PipelineError {
    /// Returns `true` if the run must stop scheduling new work.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Provider(_) | Self::Model(_))
    }
}

/// Compute retry delay based on error hints and attempt number.
pub(crate) fn compute_backoff(err: &ProviderError, attempt: u32) -> Duration {
    if let Some(ms) = err.retry_after_ms {
        return Duration::from_millis(ms);
    }

    let base_ms: u64 = match err.category {
        ErrorCategory::RateLimit => BACKOFF_SLOW_BASE_MS,
        ErrorCategory::TransientNetwork => BACKOFF_NORMAL_BASE_MS,
        _ => BACKOFF_FAST_BASE_MS,
    };

    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}

/// Run `call`, retrying errors the provider marked retryable.
///
/// `max_retries` bounds the extra attempts; `0` disables retries.
pub(crate) async fn call_with_retries<T, F, Fut>(
    max_retries: u32,
    phase: Phase,
    question_id: &QuestionId,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable && attempt <= max_retries => {
                let delay = compute_backoff(&err, attempt);
                tracing::warn!(
                    phase = phase.as_str(),
                    question_id = question_id.as_str(),
                    attempt,
                    max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Retryable provider error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
