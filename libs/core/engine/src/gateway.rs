//! The gateway trait workers call into.

use crate::error::EngineError;
use crate::record::Record;
use async_trait::async_trait;

/// Gateway to the record-matching engine.
///
/// One shared handle is used concurrently by every worker; implementations
/// must tolerate concurrent calls.
#[async_trait]
pub trait EngineGateway: Send + Sync {
    /// Ingest one record.
    ///
    /// Returns the enrichment blob when `want_info` is set and the engine
    /// produced one. Data errors mean the record is permanently
    /// unprocessable; fatal errors mean the engine can take no further work.
    async fn ingest(&self, record: &Record, want_info: bool)
        -> Result<Option<String>, EngineError>;

    /// Fetch the engine's diagnostic counters.
    ///
    /// Failures here are transient observations; callers log and continue.
    async fn stats(&self) -> Result<String, EngineError>;
}
