//! Wires the aggregation engine to a fixed-interval cron schedule.

use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::error;
use usagetrack_billing::AggregationEngine;

/// Schedule `engine.run_cycle` to fire every `interval_secs`. The
/// returned scheduler must be kept alive for the duration of the
/// process; dropping it cancels the job.
pub async fn schedule(
    engine: Arc<AggregationEngine>,
    interval_secs: u64,
) -> Result<JobScheduler, Box<dyn std::error::Error>> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_repeated_async(Duration::from_secs(interval_secs), move |_uuid, _lock| {
        let engine = engine.clone();
        Box::pin(async move {
            let now = time::OffsetDateTime::now_utc();
            if let Err(err) = engine.run_cycle(now).await {
                error!(error = %err, "aggregation cycle failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    Ok(scheduler)
}
