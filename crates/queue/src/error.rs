//! Error type for the queue adapter.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to serialize queue payload: {0}")]
    Serialization(#[from] serde_json::Error),
}
