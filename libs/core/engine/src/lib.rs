//! Engine Gateway
//!
//! Boundary to the external record-matching engine. The engine is an opaque
//! service that ingests one structured record at a time and may return an
//! enrichment blob describing the entity-resolution outcome.
//!
//! ## Contract
//!
//! - `ingest` is safe to call concurrently from any number of workers.
//! - A rejected record (`EngineError::BadInput`, `EngineError::RetryTimeout`)
//!   is the record's fault; the caller logs it and moves on.
//! - `EngineError::Fatal` means the engine is broken; the caller must stop
//!   accepting new work.
//! - `stats` is purely diagnostic and must never take the consumer down.

mod config;
mod error;
mod gateway;
mod http;
mod record;

pub use config::EngineConfig;
pub use error::EngineError;
pub use gateway::EngineGateway;
pub use http::HttpEngineGateway;
pub use record::{Record, RecordError, RecordKey};
