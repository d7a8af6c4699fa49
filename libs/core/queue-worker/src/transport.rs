//! The queue transport boundary
//!
//! The fetch loop only ever talks to this trait; the real transport is
//! injected at wiring time and faked in tests.

use crate::error::QueueError;
use crate::message::QueueMessage;
use async_trait::async_trait;
use std::time::Duration;

/// A managed message queue, seen from the consumer side.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Fetch up to `max_messages`, waiting at most `max_wait` for the first
    /// one. An empty result on timeout is normal, not an error.
    async fn fetch(
        &self,
        max_messages: usize,
        max_wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge a message so it is never redelivered.
    async fn complete(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Hand a message back to the queue for immediate redelivery.
    async fn abandon(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Copy a permanently unprocessable message to the dead-letter queue.
    ///
    /// Does not consume the message; callers pair this with `complete`.
    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError>;
}
