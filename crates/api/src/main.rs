use std::sync::Arc;

use usagetrack_api::state::AppState;
use usagetrack_queue::QueueAdapter;
use usagetrack_shared::{
    create_pool, logging, redis_conn::create_connection_manager, run_migrations, Config,
    RateLimiter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init(&config.log_level, &config.log_format);

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;

    let redis_conn = create_connection_manager(&config.redis_url).await?;
    let queue = QueueAdapter::new(redis_conn.clone());
    let rate_limiter = RateLimiter::new(redis_conn);

    let config = Arc::new(config);
    let port = config.api_port;
    let state = AppState::new(pool, queue, rate_limiter, config);
    let router = usagetrack_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "usagetrack-api listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
