//! Worker pool dispatcher
//!
//! Each submitted message becomes a task that waits for a worker permit,
//! registers with the tracker, runs the engine ingest, and reports its
//! outcome over the completion channel. Parallelism is bounded by the
//! permits; the number of live tasks is bounded by the caller's prefetch
//! credit.

use crate::config::ConsumerConfig;
use crate::message::QueueMessage;
use crate::metrics;
use crate::tracker::WorkTracker;
use engine_gateway::{EngineGateway, Record};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

/// Result of processing one message.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Ingested; carries the enrichment when WithInfo was requested.
    Success(Option<String>),
    /// The record is permanently unprocessable; consume the message.
    DataError(String),
    /// The engine or a worker is broken; stop taking new work.
    Fatal(String),
}

/// A finished message on its way back to the fetch loop.
#[derive(Debug)]
pub struct Completion {
    pub message: QueueMessage,
    pub outcome: Outcome,
}

/// Bounded worker pool feeding the record-matching engine.
pub struct Dispatcher {
    engine: Arc<dyn EngineGateway>,
    tracker: Arc<WorkTracker>,
    workers: Arc<Semaphore>,
    completions: mpsc::Sender<Completion>,
    queue_name: String,
    with_info: bool,
    next_task: AtomicUsize,
}

impl Dispatcher {
    /// Build the pool and the completion stream the fetch loop drains.
    pub fn new(
        engine: Arc<dyn EngineGateway>,
        tracker: Arc<WorkTracker>,
        config: &ConsumerConfig,
    ) -> (Self, mpsc::Receiver<Completion>) {
        let (completions, receiver) = mpsc::channel(config.prefetch.max(1));
        let dispatcher = Self {
            engine,
            tracker,
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
            completions,
            queue_name: config.queue_name.clone(),
            with_info: config.with_info,
            next_task: AtomicUsize::new(0),
        };
        (dispatcher, receiver)
    }

    /// Hand a fetched message to the pool.
    ///
    /// Spawns immediately; the task parks until a worker permit frees up.
    /// Every submitted message produces exactly one completion, whatever
    /// happens inside the task.
    pub fn submit(&self, message: QueueMessage) {
        let engine = Arc::clone(&self.engine);
        let tracker = Arc::clone(&self.tracker);
        let workers = Arc::clone(&self.workers);
        let completions = self.completions.clone();
        let queue_name = self.queue_name.clone();
        let with_info = self.with_info;
        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // pool torn down
            };

            let started = Instant::now();
            let outcome =
                AssertUnwindSafe(ingest_one(engine, tracker, &message, with_info, task_id))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        warn!(message_id = %message.id, "Ingest task panicked");
                        Outcome::Fatal("ingest task panicked".to_string())
                    });
            metrics::record_ingest_duration(&queue_name, started.elapsed());
            drop(permit);

            if completions
                .send(Completion { message, outcome })
                .await
                .is_err()
            {
                debug!("Completion channel closed, dropping outcome");
            }
        });
    }
}

/// Run one message through the engine.
///
/// The tracker entry exists exactly for the duration of the ingest call;
/// the token's drop guard covers the unwinding path.
async fn ingest_one(
    engine: Arc<dyn EngineGateway>,
    tracker: Arc<WorkTracker>,
    message: &QueueMessage,
    with_info: bool,
    worker: usize,
) -> Outcome {
    let record = match Record::parse(&message.payload) {
        Ok(record) => record,
        Err(e) => return Outcome::DataError(e.to_string()),
    };

    let mut token = tracker.register(record.key.clone(), worker);
    let result = engine.ingest(&record, with_info).await;
    token.release();

    match result {
        Ok(info) => Outcome::Success(info),
        Err(e) if e.is_data_error() => Outcome::DataError(e.to_string()),
        Err(e) => Outcome::Fatal(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_gateway::EngineError;
    use std::time::Duration;

    /// Engine double with per-record behavior and a concurrency high-water
    /// mark.
    struct FakeEngine {
        delay: Duration,
        current: AtomicUsize,
        max_concurrent: AtomicUsize,
    }

    impl FakeEngine {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                current: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EngineGateway for FakeEngine {
        async fn ingest(
            &self,
            record: &Record,
            want_info: bool,
        ) -> Result<Option<String>, EngineError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            match record.key.record_id.as_str() {
                "reject" => Err(EngineError::BadInput("no usable features".into())),
                "explode" => Err(EngineError::Fatal("engine database gone".into())),
                "panic" => panic!("worker bug"),
                id => Ok(want_info.then(|| format!("{{\"RESOLVED\":\"{id}\"}}"))),
            }
        }

        async fn stats(&self) -> Result<String, EngineError> {
            Ok("{}".to_string())
        }
    }

    fn message(record_id: &str) -> QueueMessage {
        QueueMessage::new(
            format!("msg-{record_id}"),
            format!(r#"{{"DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "{record_id}"}}"#),
        )
    }

    fn config(workers: usize, prefetch: usize) -> ConsumerConfig {
        ConsumerConfig::new("test:queue")
            .with_workers(workers)
            .with_prefetch(prefetch)
    }

    #[tokio::test]
    async fn test_outcomes_map_engine_results() {
        let engine = FakeEngine::new(Duration::ZERO);
        let tracker = WorkTracker::new();
        let (dispatcher, mut completions) =
            Dispatcher::new(engine, tracker.clone(), &config(2, 8));

        dispatcher.submit(message("ok"));
        dispatcher.submit(message("reject"));
        dispatcher.submit(message("explode"));
        dispatcher.submit(QueueMessage::new("msg-garbage", "not json"));

        let mut success = 0;
        let mut data_errors = 0;
        let mut fatals = 0;
        for _ in 0..4 {
            let completion = completions.recv().await.unwrap();
            match completion.outcome {
                Outcome::Success(_) => success += 1,
                Outcome::DataError(_) => data_errors += 1,
                Outcome::Fatal(_) => fatals += 1,
            }
        }

        assert_eq!(success, 1);
        assert_eq!(data_errors, 2); // engine rejection + unparseable payload
        assert_eq!(fatals, 1);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_with_info_carries_enrichment() {
        let engine = FakeEngine::new(Duration::ZERO);
        let tracker = WorkTracker::new();
        let (dispatcher, mut completions) =
            Dispatcher::new(engine, tracker, &config(1, 4).with_info(true));

        dispatcher.submit(message("1001"));

        let completion = completions.recv().await.unwrap();
        match completion.outcome {
            Outcome::Success(Some(info)) => assert!(info.contains("1001")),
            other => panic!("expected enrichment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parallelism_bounded_by_workers() {
        let engine = FakeEngine::new(Duration::from_millis(20));
        let tracker = WorkTracker::new();
        let (dispatcher, mut completions) =
            Dispatcher::new(engine.clone(), tracker, &config(2, 16));

        for i in 0..12 {
            dispatcher.submit(message(&i.to_string()));
        }
        for _ in 0..12 {
            completions.recv().await.unwrap();
        }

        assert!(engine.max_concurrent.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_fatal_and_pool_survives() {
        let engine = FakeEngine::new(Duration::ZERO);
        let tracker = WorkTracker::new();
        let (dispatcher, mut completions) =
            Dispatcher::new(engine, tracker.clone(), &config(1, 4));

        dispatcher.submit(message("panic"));
        let completion = completions.recv().await.unwrap();
        assert!(matches!(completion.outcome, Outcome::Fatal(_)));
        // The unwound task's drop guard released its tracker entry
        assert_eq!(tracker.count(), 0);

        // The single worker permit is back; the pool keeps processing
        dispatcher.submit(message("after"));
        let completion = completions.recv().await.unwrap();
        assert!(matches!(completion.outcome, Outcome::Success(_)));
    }
}
