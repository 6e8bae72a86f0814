//! Bounded-concurrency executor for one phase's work items.
//!
//! Items are dispatched onto a [`JoinSet`] behind a [`Semaphore`] so at most
//! `concurrency` units of work run at once. The scheduling loop never waits
//! on a single unit of work: it reaps finished tasks while waiting for a free
//! slot, so fatal errors and stop requests are seen between any two
//! dispatches.

use std::future::Future;
use std::sync::Arc;

use memorybench_types::phase::Phase;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Stop signal
// ---------------------------------------------------------------------------

/// Cooperative, cloneable stop request shared by the run driver and the
/// executor. Once stopped it stays stopped.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request a stop. In-flight work finishes; nothing new is dispatched.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`StopSignal::stop`] has been called.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once stopped.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

type Joined<R> = Result<Result<R, PipelineError>, JoinError>;

enum Slot<R> {
    Free(OwnedSemaphorePermit),
    Reaped(Joined<R>),
    Stopped,
    Closed,
}

struct Collected<R> {
    phase: Phase,
    results: Vec<Result<R, PipelineError>>,
    fatal: Option<PipelineError>,
    done: usize,
    total: usize,
}

impl<R> Collected<R> {
    fn fail(&mut self, error: PipelineError) {
        if self.fatal.is_none() {
            tracing::error!(phase = self.phase.as_str(), error = %error, "Halting phase");
            self.fatal = Some(error);
        } else {
            tracing::warn!(
                phase = self.phase.as_str(),
                error = %error,
                "Additional fatal error while draining"
            );
        }
    }

    fn absorb(&mut self, joined: Joined<R>) {
        match joined {
            Ok(Err(error)) if error.is_fatal() => self.fail(error),
            Ok(result) => {
                self.done += 1;
                tracing::debug!(
                    phase = self.phase.as_str(),
                    done = self.done,
                    total = self.total,
                    ok = result.is_ok(),
                    "Item finished"
                );
                self.results.push(result);
            }
            Err(join_err) => self.fail(PipelineError::Infrastructure(anyhow::anyhow!(
                "{} worker panicked: {join_err}",
                self.phase
            ))),
        }
    }
}

async fn next_slot<R: Send + 'static>(
    semaphore: &Arc<Semaphore>,
    join_set: &mut JoinSet<Result<R, PipelineError>>,
    stop: &StopSignal,
) -> Slot<R> {
    tokio::select! {
        biased;
        () = stop.stopped() => Slot::Stopped,
        Some(joined) = join_set.join_next(), if !join_set.is_empty() => Slot::Reaped(joined),
        permit = Arc::clone(semaphore).acquire_owned() => match permit {
            Ok(permit) => Slot::Free(permit),
            Err(_) => Slot::Closed,
        },
    }
}

/// Run `work` over `items` with at most `concurrency` invocations in flight.
///
/// Recoverable item errors are collected next to successes, in completion
/// order. The first fatal item error (or a stop request, reported as
/// [`PipelineError::Cancelled`]) stops dispatching; in-flight items are
/// drained to completion and the fatal error is returned. Items never
/// dispatched are simply not run.
///
/// # Errors
///
/// Returns the first fatal [`PipelineError`] observed.
pub async fn execute<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    stop: &StopSignal,
    phase: Phase,
    work: F,
) -> Result<Vec<Result<R, PipelineError>>, PipelineError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, PipelineError>> + Send + 'static,
{
    let total = items.len();
    let mut collected = Collected {
        phase,
        results: Vec::with_capacity(total),
        fatal: None,
        done: 0,
        total,
    };
    if total == 0 {
        return Ok(collected.results);
    }

    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let work = Arc::new(work);
    let mut join_set: JoinSet<Result<R, PipelineError>> = JoinSet::new();
    let mut pending = items.into_iter().peekable();

    tracing::info!(phase = phase.as_str(), items = total, concurrency, "Dispatching");

    'dispatch: while pending.peek().is_some() {
        if stop.is_stopped() {
            collected.fail(PipelineError::Cancelled);
            break;
        }

        let permit = loop {
            match next_slot(&semaphore, &mut join_set, stop).await {
                Slot::Free(permit) => break permit,
                Slot::Reaped(joined) => {
                    collected.absorb(joined);
                    if collected.fatal.is_some() {
                        break 'dispatch;
                    }
                }
                Slot::Stopped => {
                    collected.fail(PipelineError::Cancelled);
                    break 'dispatch;
                }
                Slot::Closed => {
                    collected.fail(PipelineError::Infrastructure(anyhow::anyhow!(
                        "{phase} executor semaphore closed"
                    )));
                    break 'dispatch;
                }
            }
        };

        let Some(item) = pending.next() else { break };
        let work = Arc::clone(&work);
        join_set.spawn(async move {
            let _permit = permit;
            work(item).await
        });
    }

    while let Some(joined) = join_set.join_next().await {
        collected.absorb(joined);
    }

    let undispatched = pending.count();
    match collected.fatal {
        Some(error) => {
            tracing::warn!(
                phase = phase.as_str(),
                finished = collected.done,
                undispatched,
                "Phase halted after draining in-flight items"
            );
            Err(error)
        }
        None => Ok(collected.results),
    }
}
