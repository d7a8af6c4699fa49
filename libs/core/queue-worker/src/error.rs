//! Consumer error types
//!
//! `QueueError` covers the transport boundary; `ConsumerError` is what the
//! fetch loop ultimately returns. A fatal stop reason survives the drain and
//! becomes the process's non-zero exit.

use thiserror::Error;

/// Queue transport errors.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Transport-level failure not tied to a backend error type
    #[error("queue transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by the consumer lifecycle.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Queue transport failed before or during consumption
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A fatal outcome stopped intake; outstanding work was drained first
    #[error("stopped after fatal error: {0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_wraps_into_consumer_error() {
        let err: ConsumerError = QueueError::Transport("socket closed".into()).into();
        assert!(matches!(err, ConsumerError::Queue(_)));
    }

    #[test]
    fn test_fatal_carries_reason() {
        let err = ConsumerError::Fatal("engine failure: db gone".into());
        assert!(err.to_string().contains("db gone"));
    }
}
