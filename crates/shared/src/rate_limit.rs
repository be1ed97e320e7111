//! Fixed-window rate limiting, backed by Redis `INCR`/`EXPIRE`.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

const WINDOW_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Outcome of a rate-limit check, carrying enough state to populate the
/// `X-RateLimit-*` response headers regardless of whether the request was
/// allowed or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window resets.
    pub reset_after_secs: u64,
}

/// A fixed 60-second window counter keyed per caller. Unlike the
/// reference implementation (which refreshes the key's TTL on every
/// increment, producing a sliding window in practice), this only sets the
/// expiry on the increment that creates the key, so a window genuinely
/// resets every 60 seconds rather than being pushed back by traffic.
#[derive(Clone)]
pub struct RateLimiter {
    conn: ConnectionManager,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Check and record one request against `key`'s window. `limit` is
    /// the maximum number of requests allowed per window.
    pub async fn check(&self, key: &str, limit: u32) -> Result<RateLimitDecision, RateLimitError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.incr(key, 1).await?;

        if count == 1 {
            let _: () = conn.expire(key, WINDOW_SECS as i64).await?;
        }

        let ttl: i64 = conn.ttl(key).await?;
        let reset_after_secs = if ttl > 0 { ttl as u64 } else { WINDOW_SECS };

        let allowed = count <= limit as u64;
        let remaining = limit.saturating_sub(count as u32);

        Ok(RateLimitDecision {
            allowed,
            limit,
            remaining,
            reset_after_secs,
        })
    }
}

/// Build the Redis key for a rate-limit check, matching the reference
/// system's `rate_limit:{tenant}:{ip}` / `rate_limit:anonymous:{ip}` shape.
pub fn rate_limit_key(tenant_id: Option<&str>, client_ip: &str) -> String {
    match tenant_id {
        Some(tenant) => format!("rate_limit:{tenant}:{client_ip}"),
        None => format!("rate_limit:anonymous:{client_ip}"),
    }
}
