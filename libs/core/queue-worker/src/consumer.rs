//! The fetch loop
//!
//! Pulls messages from the queue under the prefetch credit, hands them to
//! the dispatcher, and settles completions: acknowledge on success and data
//! error, never on a fatal outcome. The first fatal outcome (or an external
//! stop signal) flips the loop into Draining; once every outstanding
//! completion has settled the loop stops for good.

use crate::config::ConsumerConfig;
use crate::dispatcher::{Completion, Dispatcher, Outcome};
use crate::error::ConsumerError;
use crate::metrics::{self, RecordStatus};
use crate::sink::InfoSink;
use crate::tracker::WorkTracker;
use crate::transport::QueueTransport;
use engine_gateway::Record;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Throughput log cadence, in settled records.
const RATE_INTERVAL: u64 = 10_000;

/// Consumer lifecycle. Transitions are monotonic:
/// Running -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Why the consumer left Running.
#[derive(Debug, Clone)]
enum StopCause {
    Signal,
    Fatal(String),
}

/// The control loop owning fetch credit and acknowledgement decisions.
pub struct Consumer<T: QueueTransport> {
    transport: Arc<T>,
    dispatcher: Dispatcher,
    tracker: Arc<WorkTracker>,
    info_sink: Arc<dyn InfoSink>,
    config: ConsumerConfig,
    state: ShutdownState,
    cause: Option<StopCause>,
    /// Messages fetched but not yet settled; never exceeds the prefetch
    outstanding: usize,
    processed: u64,
    rate_mark: Instant,
}

impl<T: QueueTransport> Consumer<T> {
    pub fn new(
        transport: Arc<T>,
        dispatcher: Dispatcher,
        tracker: Arc<WorkTracker>,
        info_sink: Arc<dyn InfoSink>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            tracker,
            info_sink,
            config,
            state: ShutdownState::Running,
            cause: None,
            outstanding: 0,
            processed: 0,
            rate_mark: Instant::now(),
        }
    }

    /// Run until a stop signal or fatal error has been fully drained.
    ///
    /// Returns `Ok(())` for a graceful stop and the fatal reason otherwise,
    /// in both cases only after every outstanding message has settled.
    pub async fn run(
        mut self,
        mut completions: mpsc::Receiver<Completion>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConsumerError> {
        info!(
            queue = %self.config.queue_name,
            workers = self.config.workers,
            prefetch = self.config.prefetch,
            "Starting consumer"
        );

        while self.state != ShutdownState::Stopped {
            match self.state {
                ShutdownState::Running => self.run_once(&mut completions, &mut shutdown).await,
                ShutdownState::Draining => self.drain(&mut completions).await,
                ShutdownState::Stopped => {}
            }
        }

        info!(processed = self.processed, "Consumer stopped");
        match self.cause.take() {
            Some(StopCause::Fatal(reason)) => Err(ConsumerError::Fatal(reason)),
            _ => Ok(()),
        }
    }

    /// One Running iteration: settle finished work first so credit frees
    /// up, then fetch into the remaining credit.
    async fn run_once(
        &mut self,
        completions: &mut mpsc::Receiver<Completion>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        if *shutdown.borrow() {
            self.begin_drain(StopCause::Signal);
            return;
        }

        if self.outstanding > 0 {
            self.settle_ready(completions).await;
            if self.state != ShutdownState::Running {
                return;
            }
        }

        let credit = self.config.prefetch.saturating_sub(self.outstanding);
        if credit == 0 {
            return;
        }

        match self.transport.fetch(credit, self.config.fetch_wait).await {
            Ok(messages) => {
                if !messages.is_empty() {
                    metrics::record_fetch_batch(&self.config.queue_name, messages.len());
                    for message in messages {
                        debug!(message_id = %message.id, "Dispatching message");
                        self.dispatcher.submit(message);
                        self.outstanding += 1;
                    }
                }
                debug!(
                    total = self.processed,
                    outstanding = self.outstanding,
                    "Fetch cycle complete"
                );
            }
            Err(e) => {
                error!(error = %e, "Queue fetch failed");
                self.fatal(format!("queue fetch failed: {e}"));
            }
        }
    }

    /// Wait briefly for the next completion, then settle whatever else is
    /// already waiting.
    async fn settle_ready(&mut self, completions: &mut mpsc::Receiver<Completion>) {
        match timeout(self.config.poll_interval, completions.recv()).await {
            Ok(Some(completion)) => {
                self.settle(completion).await;
                while self.state == ShutdownState::Running {
                    match completions.try_recv() {
                        Ok(completion) => self.settle(completion).await,
                        Err(_) => break,
                    }
                }
            }
            Ok(None) => {
                // Channel closed with the pool gone; nothing further settles
                warn!("Completion channel closed unexpectedly");
                self.fatal("worker pool shut down unexpectedly".to_string());
            }
            Err(_) => {} // poll timeout, no completions ready
        }
    }

    /// Apply one outcome: the single place acknowledgement decisions are
    /// made.
    async fn settle(&mut self, completion: Completion) {
        let Completion { message, outcome } = completion;
        self.outstanding = self.outstanding.saturating_sub(1);

        match outcome {
            Outcome::Success(info) => {
                metrics::record_processed(&self.config.queue_name, RecordStatus::Success);
                if let Some(info) = &info {
                    self.info_sink.emit(info);
                }
                if let Err(e) = self.transport.complete(&message).await {
                    // Ingested but never acked: the queue will redeliver it
                    error!(message_id = %message.id, error = %e, "Failed to complete message");
                    self.fatal(format!("queue complete failed: {e}"));
                    return;
                }
                self.record_settled();
            }
            Outcome::DataError(reason) => {
                metrics::record_processed(&self.config.queue_name, RecordStatus::DataError);
                let label = record_label(&message.payload);
                warn!(record = %label, reason = %reason, "Record rejected, sending to dead-letter");
                if let Err(e) = self.transport.dead_letter(&message, &reason).await {
                    error!(message_id = %message.id, error = %e, "Failed to dead-letter message");
                }
                // Consumed either way; redelivery would not help this record
                if let Err(e) = self.transport.complete(&message).await {
                    error!(message_id = %message.id, error = %e, "Failed to complete message");
                    self.fatal(format!("queue complete failed: {e}"));
                    return;
                }
                self.record_settled();
            }
            Outcome::Fatal(reason) => {
                metrics::record_processed(&self.config.queue_name, RecordStatus::Fatal);
                error!(
                    message_id = %message.id,
                    record = %record_label(&message.payload),
                    reason = %reason,
                    "Fatal error processing record"
                );
                // No complete: the message stays eligible for redelivery
                if self.config.abandon_on_fatal {
                    if let Err(e) = self.transport.abandon(&message).await {
                        warn!(message_id = %message.id, error = %e, "Failed to abandon message");
                    }
                }
                self.fatal(reason);
            }
        }
    }

    /// Record a fatal cause; the first one wins and starts the drain.
    fn fatal(&mut self, reason: String) {
        if self.state == ShutdownState::Running {
            self.begin_drain(StopCause::Fatal(reason));
        } else {
            warn!(reason = %reason, "Further fatal outcome while draining");
        }
    }

    fn begin_drain(&mut self, cause: StopCause) {
        if self.state != ShutdownState::Running {
            return;
        }
        match &cause {
            StopCause::Signal => {
                info!(
                    "Stop signal received, draining {} in-flight records before exit",
                    self.outstanding
                );
            }
            StopCause::Fatal(reason) => {
                error!(
                    reason = %reason,
                    "Shutting down due to error, draining {} in-flight records before exit",
                    self.outstanding
                );
                for entry in self.tracker.scan(Duration::ZERO) {
                    warn!(
                        record = %entry.key,
                        worker = entry.worker,
                        elapsed_secs = entry.elapsed.as_secs(),
                        "Still processing"
                    );
                }
            }
        }
        self.cause = Some(cause);
        self.state = ShutdownState::Draining;
    }

    /// Settle everything outstanding, issuing no new fetches, then stop.
    async fn drain(&mut self, completions: &mut mpsc::Receiver<Completion>) {
        while self.outstanding > 0 {
            match completions.recv().await {
                Some(completion) => self.settle(completion).await,
                None => {
                    warn!(
                        outstanding = self.outstanding,
                        "Completion channel closed with work outstanding"
                    );
                    break;
                }
            }
        }
        debug_assert_eq!(self.tracker.count(), 0);
        self.state = ShutdownState::Stopped;
    }

    fn record_settled(&mut self) {
        self.processed += 1;
        if self.processed % RATE_INTERVAL == 0 {
            let elapsed = self.rate_mark.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                (RATE_INTERVAL as f64 / elapsed) as u64
            } else {
                0
            };
            info!("Processed {} adds, {} records per second", self.processed, rate);
            self.rate_mark = Instant::now();
        }
    }
}

/// Best-effort record identifier for log lines; the payload may be the very
/// thing that failed to parse.
fn record_label(payload: &str) -> String {
    Record::parse(payload)
        .map(|record| record.key.to_string())
        .unwrap_or_else(|_| "<unparseable record>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_label() {
        let label = record_label(r#"{"DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "7"}"#);
        assert_eq!(label, "CUSTOMERS : 7");

        assert_eq!(record_label("junk"), "<unparseable record>");
    }
}
