use std::sync::Arc;

use usagetrack_billing::AggregationEngine;
use usagetrack_queue::QueueAdapter;
use usagetrack_shared::{create_pool, logging, redis_conn::create_connection_manager, run_migrations, Config};
use usagetrack_worker::{aggregation_scheduler, EventProcessor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init(&config.log_level, &config.log_format);

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;

    let redis_conn = create_connection_manager(&config.redis_url).await?;
    let queue = QueueAdapter::new(redis_conn);

    let engine = Arc::new(AggregationEngine::new(pool.clone()));
    let _scheduler = aggregation_scheduler::schedule(engine, config.aggregation_interval_secs)
        .await
        .map_err(|err| anyhow::anyhow!("failed to start aggregation scheduler: {err}"))?;

    let processor = EventProcessor::new(
        pool,
        queue,
        config.queue_name.clone(),
        config.queue_batch_size,
        config.max_retry_count,
    );

    tracing::info!("usagetrack-worker started");
    loop {
        if let Err(err) = processor.run_once().await {
            tracing::error!(error = %err, "event processor iteration failed");
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }
}
