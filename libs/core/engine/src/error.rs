//! Engine error taxonomy
//!
//! Two data-error classes (the record's fault, consume and move on) and one
//! fatal class (the engine's fault, stop taking new work).

use thiserror::Error;

/// Errors returned by the record-matching engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The record was malformed or rejected by the engine.
    #[error("record rejected: {0}")]
    BadInput(String),

    /// The engine gave up on the record after exhausting its retry window.
    #[error("record retry window exhausted: {0}")]
    RetryTimeout(String),

    /// The engine configuration blob is missing or malformed.
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// The engine itself is broken; no further records should be submitted.
    #[error("engine failure: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Data errors consume the message; redelivery would not help.
    pub fn is_data_error(&self) -> bool {
        matches!(self, EngineError::BadInput(_) | EngineError::RetryTimeout(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Config(_) | EngineError::Fatal(_))
    }
}
