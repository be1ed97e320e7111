//! Redis-backed FIFO queue adapter used by the ingest API (push, overflow
//! fallback) and the worker (consume, requeue, dead-letter).

pub mod adapter;
pub mod error;

pub use adapter::QueueAdapter;
pub use error::QueueError;

/// Primary work queue name default, overridable via `Config::queue_name`.
pub const DEFAULT_QUEUE: &str = "usage_events";
/// Dead-letter queue name: events whose `retry_count` has reached the
/// configured maximum land here instead of being requeued indefinitely.
pub const DEAD_LETTER_QUEUE: &str = "dead_letter_events";
