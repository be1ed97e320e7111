//! Redis-backed FIFO queue adapter.
//!
//! Two named queues are used throughout the pipeline: `usage_events` (the
//! primary work queue) and `dead_letter_events` (events that exhausted
//! their retry budget). Enqueue and retry both push with `LPUSH`; both
//! `PopBlocking` and `PopNoWait` drain with the matching `*POP` from the
//! opposite end, so the list stays FIFO regardless of which call-site is
//! pushing.

use crate::error::QueueError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

#[derive(Clone)]
pub struct QueueAdapter {
    conn: ConnectionManager,
}

impl QueueAdapter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Append `payload` to `queue`. Used both for fresh ingest and for
    /// re-queuing a failed batch — the reference system uses the same
    /// verb (`LPUSH`) for both, so a retried event and a newly ingested
    /// one are indistinguishable to a consumer.
    pub async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(queue, payload).await?;
        Ok(())
    }

    /// Push every payload in one round trip. Atomic from the client's
    /// perspective: either the whole pipeline is sent or none of it is,
    /// though Redis itself does not roll back a partially-applied
    /// pipeline on a mid-stream connection failure.
    pub async fn push_batch(&self, queue: &str, payloads: &[String]) -> Result<(), QueueError> {
        if payloads.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for payload in payloads {
            pipe.lpush(queue, payload);
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Block up to `timeout` waiting for an item on any of `queues`,
    /// returning the queue it came from and the raw payload.
    pub async fn pop_blocking(
        &self,
        queues: &[&str],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, QueueError> {
        let mut conn = self.conn.clone();
        let result: Option<(String, String)> =
            conn.brpop(queues, timeout.as_secs_f64()).await?;
        Ok(result)
    }

    /// Pop one item from `queue` without blocking, or `None` if empty.
    pub async fn pop_nowait(&self, queue: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = conn.rpop(queue, None).await?;
        Ok(result)
    }

    /// Re-queue a batch after a failed store write, or after an
    /// individual event's retry count is still under the limit. Same
    /// operation as `push`; kept as a distinct method name so call sites
    /// read as "this is a retry" rather than "this is new work".
    pub async fn requeue(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        self.push(queue, payload).await
    }

    /// Number of items currently sitting in `queue`.
    pub async fn len(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(queue).await?;
        Ok(len)
    }
}
