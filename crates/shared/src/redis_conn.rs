//! Redis connection bootstrap, shared by the queue adapter, the rate
//! limiter, and the query cache.

use redis::aio::ConnectionManager;

/// Build a `ConnectionManager`, which multiplexes commands over a single
/// connection and reconnects automatically on transient failures — the
/// right shape for a long-lived background worker or API process, as
/// opposed to a connection pool sized for short-lived checkouts.
pub async fn create_connection_manager(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let client = redis::Client::open(redis_url)?;
    client.get_connection_manager().await
}
