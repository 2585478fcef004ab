use super::event::ReconcileEvent;
use super::reconciler::{PassOutcome, Reconciler};
use crate::error::Result;
use crate::metrics::metrics;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Teardown,
    Shutdown,
    ChannelClosed,
}

impl LoopExit {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopExit::Teardown => "teardown",
            LoopExit::Shutdown => "shutdown",
            LoopExit::ChannelClosed => "channel_closed",
        }
    }
}

pub struct LoopReport {
    pub exit: LoopExit,
    pub reconciler: Reconciler,
}

enum PassResult {
    Finished(Result<PassOutcome>),
    Cancelled(LoopExit),
}

/// Single-task loop feeding events into a [`Reconciler`].
///
/// Events arriving while a pass runs are buffered and absorbed together once it
/// finishes, so at most one follow-up pass is ever pending. Teardown, the
/// shutdown token or a closed channel cancel an in-flight pass.
pub struct ReconcileLoop {
    reconciler: Reconciler,
    events: mpsc::Receiver<ReconcileEvent>,
    shutdown: CancellationToken,
}

impl ReconcileLoop {
    pub fn new(
        reconciler: Reconciler,
        events: mpsc::Receiver<ReconcileEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            events,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<LoopReport> {
        let ReconcileLoop {
            mut reconciler,
            mut events,
            shutdown,
        } = self;

        let recheck = reconciler.recheck_interval();
        let mut recheck_at = recheck.map(|interval| Instant::now() + interval);
        let mut retry_at: Option<Instant> = None;
        let mut pending = true;

        loop {
            if !pending {
                let wake = earliest(retry_at, recheck_at);
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        return Ok(finish(LoopExit::Shutdown, reconciler));
                    }
                    event = events.recv() => match event {
                        None => return Ok(finish(LoopExit::ChannelClosed, reconciler)),
                        Some(event) if event.is_teardown() => {
                            return Ok(finish(LoopExit::Teardown, reconciler));
                        }
                        Some(event) => pending = reconciler.absorb(event).await,
                    },
                    _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                        tracing::debug!(
                            retry = retry_at.is_some(),
                            "reconcile timer fired"
                        );
                        pending = true;
                    }
                }
                continue;
            }

            pending = false;
            let mut buffered = Vec::new();
            let result = {
                let pass = reconciler.reconcile();
                tokio::pin!(pass);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break PassResult::Cancelled(LoopExit::Shutdown),
                        outcome = &mut pass => break PassResult::Finished(outcome),
                        event = events.recv() => match event {
                            None => break PassResult::Cancelled(LoopExit::ChannelClosed),
                            Some(event) if event.is_teardown() => {
                                break PassResult::Cancelled(LoopExit::Teardown);
                            }
                            Some(event) => buffered.push(event),
                        },
                    }
                }
            };

            let outcome = match result {
                PassResult::Cancelled(exit) => {
                    metrics().record_cancelled_pass();
                    tracing::info!(
                        exit = exit.as_str(),
                        dropped_events = buffered.len(),
                        "reconcile pass cancelled"
                    );
                    return Ok(finish(exit, reconciler));
                }
                PassResult::Finished(outcome) => outcome?,
            };

            tracing::debug!(
                state = outcome.status.state.as_str(),
                applied = outcome.applied,
                published = outcome.published,
                "reconcile pass finished"
            );

            retry_at = outcome.retry_after.map(|delay| Instant::now() + delay);
            recheck_at = recheck.map(|interval| Instant::now() + interval);

            if !buffered.is_empty() {
                metrics().record_coalesced_events(buffered.len());
                for event in buffered {
                    if reconciler.absorb(event).await {
                        pending = true;
                    }
                }
            }
        }
    }
}

fn finish(exit: LoopExit, reconciler: Reconciler) -> LoopReport {
    tracing::info!(exit = exit.as_str(), passes = reconciler.passes(), "reconcile loop stopped");
    LoopReport { exit, reconciler }
}

fn earliest(lhs: Option<Instant>, rhs: Option<Instant>) -> Option<Instant> {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => Some(lhs.min(rhs)),
        (lhs, rhs) => lhs.or(rhs),
    }
}
