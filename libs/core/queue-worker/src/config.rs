//! Consumer configuration

use std::time::Duration;

/// Deterministic default worker count: the number of available processing
/// units, falling back to 4 when the runtime cannot tell.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Configuration for the consumer core.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue name, used for logging and metric labels
    pub queue_name: String,

    /// Number of concurrent ingest workers
    pub workers: usize,

    /// Maximum messages fetched-but-not-yet-acknowledged at once
    pub prefetch: usize,

    /// Age at which an in-flight record is reported as long-running
    pub long_record_threshold: Duration,

    /// Cadence of the stats / long-record observer
    pub stats_interval: Duration,

    /// Maximum wait for the first message of a fetch
    pub fetch_wait: Duration,

    /// How long the fetch loop waits on completions when it cannot fetch
    pub poll_interval: Duration,

    /// Emit the engine's enrichment output for each record
    pub with_info: bool,

    /// Actively hand fatally-failed messages back instead of only leaving
    /// them un-acknowledged
    pub abandon_on_fatal: bool,
}

impl ConsumerConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        let workers = default_parallelism();
        Self {
            queue_name: queue_name.into(),
            workers,
            prefetch: workers,
            long_record_threshold: Duration::from_secs(300),
            stats_interval: Duration::from_secs(150),
            fetch_wait: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            with_info: false,
            abandon_on_fatal: false,
        }
    }

    /// Set the worker count (floored at 1)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the prefetch limit (floored at 1)
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Set the long-record threshold
    pub fn with_long_record_threshold(mut self, threshold: Duration) -> Self {
        self.long_record_threshold = threshold;
        self
    }

    /// Set the observer cadence (floored at 1s; a zero-period timer is a
    /// busy loop)
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval.max(Duration::from_secs(1));
        self
    }

    /// Set the fetch wait
    pub fn with_fetch_wait(mut self, wait: Duration) -> Self {
        self.fetch_wait = wait;
        self
    }

    /// Set the completion poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable WithInfo output
    pub fn with_info(mut self, enabled: bool) -> Self {
        self.with_info = enabled;
        self
    }

    /// Enable or disable active abandonment on fatal outcomes
    pub fn with_abandon_on_fatal(mut self, enabled: bool) -> Self {
        self.abandon_on_fatal = enabled;
        self
    }
}
