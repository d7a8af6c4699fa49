//! Stats and long-record reporter
//!
//! A periodic observer with no control authority: it emits the engine's
//! diagnostic counters and a warning per long-running in-flight record.
//! Observation failures are logged and never escalate.

use crate::config::ConsumerConfig;
use crate::tracker::WorkTracker;
use engine_gateway::EngineGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodic engine-stats and long-record observer.
pub struct StatsReporter {
    engine: Arc<dyn EngineGateway>,
    tracker: Arc<WorkTracker>,
    threshold: Duration,
    interval: Duration,
    workers: usize,
}

impl StatsReporter {
    pub fn new(
        engine: Arc<dyn EngineGateway>,
        tracker: Arc<WorkTracker>,
        config: &ConsumerConfig,
    ) -> Self {
        Self {
            engine,
            tracker,
            threshold: config.long_record_threshold,
            interval: config.stats_interval,
            workers: config.workers,
        }
    }

    /// Tick until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately; skip it

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.observe().await;
                }
            }
        }
        debug!("Stats reporter stopped");
    }

    /// One observation pass. Returns the number of long-running entries
    /// seen.
    pub async fn observe(&self) -> usize {
        match self.engine.stats().await {
            Ok(stats) => info!(stats = %stats, "Engine stats"),
            Err(e) => warn!(error = %e, "Failed to fetch engine stats"),
        }

        let overdue = self.tracker.scan(self.threshold);
        for entry in &overdue {
            warn!(
                record = %entry.key,
                worker = entry.worker,
                elapsed_secs = entry.elapsed.as_secs(),
                "Long-running record"
            );
        }
        if overdue.len() >= self.workers {
            warn!(
                "All {} workers are busy with long-running records",
                self.workers
            );
        }
        overdue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_gateway::{EngineError, Record, RecordKey};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeEngine {
        fail_stats: AtomicBool,
    }

    #[async_trait]
    impl EngineGateway for FakeEngine {
        async fn ingest(
            &self,
            _record: &Record,
            _want_info: bool,
        ) -> Result<Option<String>, EngineError> {
            Ok(None)
        }

        async fn stats(&self) -> Result<String, EngineError> {
            if self.fail_stats.load(Ordering::SeqCst) {
                Err(EngineError::Fatal("stats endpoint down".into()))
            } else {
                Ok(r#"{"loadedRecords": 42}"#.to_string())
            }
        }
    }

    fn key(id: &str) -> RecordKey {
        RecordKey {
            data_source: "CUSTOMERS".into(),
            record_id: id.into(),
        }
    }

    fn reporter(engine: Arc<FakeEngine>, tracker: Arc<WorkTracker>) -> StatsReporter {
        let config = ConsumerConfig::new("test:queue")
            .with_workers(2)
            .with_long_record_threshold(Duration::from_millis(20));
        StatsReporter::new(engine, tracker, &config)
    }

    #[tokio::test]
    async fn test_observe_counts_overdue_entries() {
        let engine = Arc::new(FakeEngine {
            fail_stats: AtomicBool::new(false),
        });
        let tracker = WorkTracker::new();
        let reporter = reporter(engine, tracker.clone());

        let _slow = tracker.register(key("slow"), 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Registered after the sleep, so still fresh
        let _fresh = tracker.register(key("fresh"), 1);

        assert_eq!(reporter.observe().await, 1);
    }

    #[tokio::test]
    async fn test_observe_reports_until_released() {
        let engine = Arc::new(FakeEngine {
            fail_stats: AtomicBool::new(false),
        });
        let tracker = WorkTracker::new();
        let reporter = reporter(engine, tracker.clone());

        let mut token = tracker.register(key("slow"), 0);
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Reported on every observation while still in flight
        assert_eq!(reporter.observe().await, 1);
        assert_eq!(reporter.observe().await, 1);

        token.release();
        assert_eq!(reporter.observe().await, 0);
    }

    #[tokio::test]
    async fn test_stats_failure_never_escalates() {
        let engine = Arc::new(FakeEngine {
            fail_stats: AtomicBool::new(true),
        });
        let tracker = WorkTracker::new();
        let reporter = reporter(engine, tracker);

        // Must not panic or error; there is simply nothing overdue
        assert_eq!(reporter.observe().await, 0);
    }
}
