//! Queue Worker
//!
//! The concurrency and lifecycle core of the resolver consumer: messages are
//! fetched from a queue under a prefetch credit, dispatched to a bounded
//! worker pool that feeds each record to the record-matching engine, tracked
//! while in flight, and acknowledged exactly once per outcome.
//!
//! ## Pieces
//!
//! - [`QueueTransport`]: the queue boundary (fetch / complete / abandon /
//!   dead-letter), with a Redis Streams implementation in [`RedisQueue`]
//! - [`WorkTracker`]: concurrent registry of in-flight records, scanned
//!   periodically for long-running entries
//! - [`Dispatcher`]: semaphore-bounded worker pool returning completions
//!   over a channel
//! - [`Consumer`]: the fetch loop and its Running → Draining → Stopped
//!   shutdown protocol
//! - [`StatsReporter`]: periodic engine stats + long-record warnings
//!
//! ## Shutdown
//!
//! A stop signal or any fatal outcome stops new fetches; outstanding work is
//! drained and settled under the normal acknowledgement rules before the
//! consumer returns. A message whose outcome was fatal is never acknowledged,
//! so the queue redelivers it.

mod config;
mod consumer;
mod dispatcher;
mod error;
mod message;
pub mod metrics;
mod redis_queue;
mod reporter;
mod sink;
mod tracker;
mod transport;

pub use config::{default_parallelism, ConsumerConfig};
pub use consumer::{Consumer, ShutdownState};
pub use dispatcher::{Completion, Dispatcher, Outcome};
pub use error::{ConsumerError, QueueError};
pub use message::QueueMessage;
pub use redis_queue::{RedisQueue, RedisQueueConfig};
pub use reporter::StatsReporter;
pub use sink::{InfoSink, StdoutInfoSink};
pub use tracker::{LongRunning, TrackerToken, WorkTracker};
pub use transport::QueueTransport;
