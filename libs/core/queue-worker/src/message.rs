//! Queue message model

/// A message delivered by the queue transport.
///
/// The payload is opaque here; workers parse it at the engine boundary. `id`
/// is the queue-native handle used for acknowledgement; on stream transports
/// it doubles as the delivery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub payload: String,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}
