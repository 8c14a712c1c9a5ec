//! Per-message handling: decode, forward, log.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::forwarder::{ForwardOutcome, ForwardingClient};
use crate::router::MessageRouter;
use crate::transport::InboundMessage;

/// Consumer of inbound bus messages.
///
/// Implementations handle each message independently; calls may overlap.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: InboundMessage) -> impl Future<Output = ()> + Send;
}

/// Dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    dropped: AtomicU64,
    accepted: AtomicU64,
    warned: AtomicU64,
    rejected: AtomicU64,
    transport_failures: AtomicU64,
    thresholds_exceeded: AtomicU64,
}

impl DispatchStats {
    fn record(&self, outcome: &ForwardOutcome) {
        let counter = match outcome {
            ForwardOutcome::Accepted(acceptance) => {
                if acceptance.as_ref().is_some_and(|a| a.threshold_exceeded) {
                    self.thresholds_exceeded.fetch_add(1, Ordering::Relaxed);
                }
                &self.accepted
            }
            ForwardOutcome::Warned { .. } => &self.warned,
            ForwardOutcome::Rejected { .. } => &self.rejected,
            ForwardOutcome::TransportFailed { .. } => &self.transport_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            warned: self.warned.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            thresholds_exceeded: self.thresholds_exceeded.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`DispatchStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages handed to the dispatcher.
    pub received: u64,
    /// Messages that could not be decoded.
    pub dropped: u64,
    pub accepted: u64,
    pub warned: u64,
    pub rejected: u64,
    pub transport_failures: u64,
    /// Accepted readings that tripped a threshold.
    pub thresholds_exceeded: u64,
}

/// Turns bus messages into API requests.
pub struct Dispatcher {
    router: MessageRouter,
    client: ForwardingClient,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(router: MessageRouter, client: ForwardingClient) -> Self {
        Self {
            router,
            client,
            stats: DispatchStats::default(),
        }
    }

    /// Decode and forward one message.
    ///
    /// Returns `None` if the message was dropped before any request was
    /// made. Failures are logged here and never escalated.
    pub async fn dispatch(&self, message: InboundMessage) -> Option<ForwardOutcome> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let reading = match self.router.decode(&message.topic, &message.payload) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %message.topic, error = %e, "Dropping message");
                return None;
            }
        };

        let outcome = self.client.send(&reading).await;
        self.stats.record(&outcome);

        match outcome.clone().into_result() {
            Ok(delivered) => {
                debug!(
                    sensor_id = %reading.sensor_id(),
                    outcome = delivered.kind(),
                    "Reading delivered"
                );
            }
            Err(e) => {
                error!(
                    sensor_id = %reading.sensor_id(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Failed to forward reading"
                );
            }
        }

        Some(outcome)
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl MessageHandler for Dispatcher {
    async fn handle(&self, message: InboundMessage) {
        self.dispatch(message).await;
    }
}

/// Run `handler` over every message from `rx`, at most `max_in_flight` at a time.
///
/// Returns once the channel is closed and every spawned handler finished.
pub async fn pump<H: MessageHandler>(
    mut rx: mpsc::Receiver<InboundMessage>,
    handler: Arc<H>,
    max_in_flight: usize,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut tasks = JoinSet::new();

    while let Some(message) = rx.recv().await {
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }

        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            // Never closed while we hold the Arc.
            Err(_) => break,
        };

        let handler = handler.clone();
        tasks.spawn(async move {
            let _permit = permit;
            handler.handle(message).await;
        });
    }

    debug!(in_flight = tasks.len(), "Inbound channel closed, draining handlers");
    while let Some(result) = tasks.join_next().await {
        log_join_result(result);
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Message handler panicked");
        } else {
            warn!(error = %e, "Message handler was cancelled");
        }
    }
}
