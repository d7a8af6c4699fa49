//! Redis Streams queue transport
//!
//! Messages live in a stream, consumed through a consumer group so
//! un-acknowledged deliveries stay pending and get redelivered. `complete`
//! is XACK; `abandon` re-enqueues then acks the original; `dead_letter`
//! copies payload + reason to a DLQ stream.

use crate::error::QueueError;
use crate::message::QueueMessage;
use crate::transport::QueueTransport;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Stream entry field carrying the record payload.
const PAYLOAD_FIELD: &str = "record";

/// Configuration for the Redis Streams transport.
#[derive(Debug, Clone)]
pub struct RedisQueueConfig {
    /// Redis connection URL
    pub url: String,

    /// Stream key the consumer drains
    pub queue_name: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Unique consumer ID (auto-generated if not provided)
    pub consumer_id: String,

    /// Dead letter stream for rejected records
    pub dead_letter_stream: String,
}

impl RedisQueueConfig {
    pub fn new(url: impl Into<String>, queue_name: impl Into<String>) -> Self {
        let queue_name = queue_name.into();
        Self {
            url: url.into(),
            dead_letter_stream: format!("{queue_name}:dlq"),
            consumer_group: "resolver_workers".to_string(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            queue_name,
        }
    }

    /// Set the consumer group name
    pub fn with_consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = group.into();
        self
    }

    /// Set the consumer ID
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the dead letter stream name
    pub fn with_dead_letter_stream(mut self, stream: impl Into<String>) -> Self {
        self.dead_letter_stream = stream.into();
        self
    }
}

/// Queue transport over Redis Streams.
pub struct RedisQueue {
    redis: ConnectionManager,
    config: RedisQueueConfig,
}

impl RedisQueue {
    /// Connect, verify with PING, and ensure the consumer group exists.
    pub async fn connect(config: RedisQueueConfig) -> Result<Self, QueueError> {
        info!(url = %config.url, queue = %config.queue_name, "Connecting to queue");

        let client = redis::Client::open(config.url.as_str())?;
        let redis = ConnectionManager::new(client).await?;

        // Verify connection with PING
        let mut conn = redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        let queue = Self { redis, config };
        queue.ensure_consumer_group().await?;

        info!(
            queue = %queue.config.queue_name,
            group = %queue.config.consumer_group,
            consumer = %queue.config.consumer_id,
            "Queue transport ready"
        );
        Ok(queue)
    }

    /// Create the consumer group if it doesn't exist yet.
    async fn ensure_consumer_group(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.queue_name)
            .arg(&self.config.consumer_group)
            .arg("0") // Start from beginning
            .arg("MKSTREAM") // Create stream if it doesn't exist
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    queue = %self.config.queue_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    queue = %self.config.queue_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
                Ok(())
            }
            Err(e) => Err(QueueError::Redis(e)),
        }
    }
}

#[async_trait]
impl QueueTransport for RedisQueue {
    async fn fetch(
        &self,
        max_messages: usize,
        max_wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<Option<Vec<(String, Vec<(String, Vec<(String, String)>)>)>>> =
            redis::cmd("XREADGROUP")
                .arg("GROUP")
                .arg(&self.config.consumer_group)
                .arg(&self.config.consumer_id)
                .arg("BLOCK")
                .arg(max_wait.as_millis() as u64)
                .arg("COUNT")
                .arg(max_messages)
                .arg("STREAMS")
                .arg(&self.config.queue_name)
                .arg(">") // Only new messages
                .query_async(&mut conn)
                .await;

        match result {
            Ok(Some(streams)) => {
                let messages: Vec<QueueMessage> = streams
                    .into_iter()
                    .flat_map(|(_, entries)| entries)
                    .map(|(id, fields)| QueueMessage::new(id, payload_from_fields(fields)))
                    .collect();
                Ok(messages)
            }
            Ok(None) => Ok(vec![]), // No messages (blocking timeout)
            Err(e) => Err(QueueError::Redis(e)),
        }
    }

    async fn complete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.queue_name)
            .arg(&self.config.consumer_group)
            .arg(&message.id)
            .query_async(&mut conn)
            .await?;

        debug!(message_id = %message.id, "Completed message");
        Ok(())
    }

    async fn abandon(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        // Re-enqueue under a fresh id, then ack the original; on a stream
        // this is what makes the message immediately redeliverable.
        let _: String = redis::cmd("XADD")
            .arg(&self.config.queue_name)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&message.payload)
            .query_async(&mut conn)
            .await?;

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.queue_name)
            .arg(&self.config.consumer_group)
            .arg(&message.id)
            .query_async(&mut conn)
            .await?;

        debug!(message_id = %message.id, "Abandoned message for redelivery");
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let _: String = redis::cmd("XADD")
            .arg(&self.config.dead_letter_stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&message.payload)
            .arg("error")
            .arg(reason)
            .query_async(&mut conn)
            .await?;

        debug!(message_id = %message.id, "Dead-lettered message");
        Ok(())
    }
}

/// Pull the record payload out of a stream entry's field list.
///
/// Entries written by other producers may use a different field name; fall
/// back to the first field's value rather than dropping the message.
fn payload_from_fields(fields: Vec<(String, String)>) -> String {
    let mut fallback = None;
    for (key, value) in fields {
        if key == PAYLOAD_FIELD {
            return value;
        }
        if fallback.is_none() {
            fallback = Some(value);
        }
    }
    fallback.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RedisQueueConfig::new("redis://127.0.0.1:6379", "resolver:records");

        assert_eq!(config.queue_name, "resolver:records");
        assert_eq!(config.dead_letter_stream, "resolver:records:dlq");
        assert_eq!(config.consumer_group, "resolver_workers");
        assert!(config.consumer_id.starts_with("worker-"));
    }

    #[test]
    fn test_config_builder() {
        let config = RedisQueueConfig::new("redis://127.0.0.1:6379", "resolver:records")
            .with_consumer_group("custom_group")
            .with_consumer_id("worker-1")
            .with_dead_letter_stream("custom:dlq");

        assert_eq!(config.consumer_group, "custom_group");
        assert_eq!(config.consumer_id, "worker-1");
        assert_eq!(config.dead_letter_stream, "custom:dlq");
    }

    #[test]
    fn test_payload_from_fields() {
        let fields = vec![
            ("other".to_string(), "ignored".to_string()),
            ("record".to_string(), "{\"RECORD_ID\":\"1\"}".to_string()),
        ];
        assert_eq!(payload_from_fields(fields), "{\"RECORD_ID\":\"1\"}");

        let fallback_only = vec![("body".to_string(), "raw".to_string())];
        assert_eq!(payload_from_fields(fallback_only), "raw");

        assert_eq!(payload_from_fields(vec![]), "");
    }
}
