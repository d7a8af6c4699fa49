//! Prometheus metrics for the consumer
//!
//! Provides observability into throughput and in-flight work.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");
        info!("Prometheus metrics initialized");
        handle
    });
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Outcome label for the processed-records counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Success,
    DataError,
    Fatal,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::DataError => "data_error",
            RecordStatus::Fatal => "fatal",
        }
    }
}

/// Record a settled message outcome
pub fn record_processed(queue: &str, status: RecordStatus) {
    counter!(
        "consumer_records_processed_total",
        "queue" => queue.to_string(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// Record the duration of one ingest call
pub fn record_ingest_duration(queue: &str, duration: Duration) {
    histogram!(
        "consumer_ingest_duration_seconds",
        "queue" => queue.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the size of a fetched batch
pub fn record_fetch_batch(queue: &str, size: usize) {
    histogram!(
        "consumer_fetch_batch_size",
        "queue" => queue.to_string()
    )
    .record(size as f64);
}

/// Update the in-flight records gauge
pub fn set_in_flight(count: usize) {
    gauge!("consumer_in_flight_records").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(RecordStatus::Success.as_str(), "success");
        assert_eq!(RecordStatus::DataError.as_str(), "data_error");
        assert_eq!(RecordStatus::Fatal.as_str(), "fatal");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_metrics();
        init_metrics();
        record_processed("test:queue", RecordStatus::Success);
        assert!(render_metrics().contains("consumer_records_processed_total"));
    }
}
