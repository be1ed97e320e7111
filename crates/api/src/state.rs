//! Shared application state, cloned into every request handler.

use std::sync::Arc;

use sqlx::PgPool;
use usagetrack_queue::QueueAdapter;
use usagetrack_shared::{Config, RateLimiter};

use crate::auth::ApiKeyManager;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub queue: QueueAdapter,
    pub rate_limiter: RateLimiter,
    pub api_key_manager: ApiKeyManager,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        queue: QueueAdapter,
        rate_limiter: RateLimiter,
        config: Arc<Config>,
    ) -> Self {
        let api_key_manager = ApiKeyManager::new(&config.api_key_hmac_secret);
        Self {
            pool,
            queue,
            rate_limiter,
            api_key_manager,
            config,
        }
    }
}
