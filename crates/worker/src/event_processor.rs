//! Event processor: drains the `usage_events` queue, enriches and prices
//! each event, and upserts the batch into the store. Failures are split
//! between re-queue (under the retry budget) and the dead-letter queue.

use serde_json::{json, Value};
use sqlx::PgPool;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use usagetrack_billing::pricing::{price, select_rule};
use usagetrack_queue::{QueueAdapter, QueueError, DEAD_LETTER_QUEUE};
use usagetrack_shared::NormalizedEvent;

const POLL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EventProcessor {
    pool: PgPool,
    queue: QueueAdapter,
    queue_name: String,
    batch_size: u32,
    max_retry_count: u32,
}

/// One event's outcome after enrichment and pricing, ready to upsert.
struct ProcessedEvent {
    normalized: NormalizedEvent,
    total_cost: rust_decimal::Decimal,
    billing_info: Value,
    status: &'static str,
    error_message: Option<String>,
    retry_count: i32,
}

impl EventProcessor {
    pub fn new(
        pool: PgPool,
        queue: QueueAdapter,
        queue_name: String,
        batch_size: u32,
        max_retry_count: u32,
    ) -> Self {
        Self {
            pool,
            queue,
            queue_name,
            batch_size,
            max_retry_count,
        }
    }

    /// One iteration of the consumer loop: blocking-pop with a 30s
    /// timeout, then drain up to `batch_size - 1` more without blocking.
    pub async fn run_once(&self) -> Result<(), QueueError> {
        let Some((_, first_payload)) = self
            .queue
            .pop_blocking(&[&self.queue_name], POLL_TIMEOUT)
            .await?
        else {
            return Ok(());
        };

        let mut payloads = vec![first_payload];
        for _ in 1..self.batch_size {
            match self.queue.pop_nowait(&self.queue_name).await? {
                Some(payload) => payloads.push(payload),
                None => break,
            }
        }

        info!(count = payloads.len(), "processing event batch");
        self.process_batch(payloads).await;
        Ok(())
    }

    async fn process_batch(&self, payloads: Vec<String>) {
        let mut processed = Vec::with_capacity(payloads.len());
        let mut unparseable = 0usize;

        for payload in payloads {
            let normalized: NormalizedEvent = match serde_json::from_str(&payload) {
                Ok(event) => event,
                Err(err) => {
                    error!(error = %err, "dropping unparseable queue payload");
                    unparseable += 1;
                    continue;
                }
            };
            processed.push(self.enrich_and_price(normalized).await);
        }

        if unparseable > 0 {
            warn!(count = unparseable, "events dropped for being unparseable");
        }

        if let Err(err) = self.upsert_batch(&processed).await {
            error!(error = %err, "batch upsert failed, re-enqueuing whole batch for retry");
            for event in &processed {
                let payload = serde_json::to_string(&event.normalized).unwrap_or_default();
                let _ = self.queue.requeue(&self.queue_name, &payload).await;
            }
            return;
        }

        for event in processed {
            if event.status == "failed" {
                self.route_failure(event).await;
            }
        }
    }

    /// Enrichment + pricing for one event. Never returns `Err` — a
    /// pricing or database failure marks the event `failed` rather than
    /// aborting the batch.
    async fn enrich_and_price(&self, mut normalized: NormalizedEvent) -> ProcessedEvent {
        enrich(&mut normalized);

        let rule = match select_rule(
            &self.pool,
            normalized.service_type,
            &normalized.service_provider,
            normalized.metadata.get("model").and_then(|v| v.as_str()),
            normalized.timestamp,
        )
        .await
        {
            Ok(rule) => rule,
            Err(err) => {
                return ProcessedEvent {
                    retry_count: 1,
                    normalized,
                    total_cost: rust_decimal::Decimal::ZERO,
                    billing_info: json!({}),
                    status: "failed",
                    error_message: Some(err.to_string()),
                };
            }
        };

        match price(&normalized, rule.as_ref()) {
            Ok(billing_info) => ProcessedEvent {
                total_cost: billing_info.total_cost,
                billing_info: serde_json::to_value(&billing_info).unwrap_or_default(),
                status: "completed",
                error_message: None,
                retry_count: 0,
                normalized,
            },
            Err(err) => ProcessedEvent {
                retry_count: 1,
                normalized,
                total_cost: rust_decimal::Decimal::ZERO,
                billing_info: json!({}),
                status: "failed",
                error_message: Some(err.to_string()),
            },
        }
    }

    /// `ON CONFLICT (event_id) DO UPDATE` on the mutable columns, so
    /// at-least-once delivery still lands at most one effective row.
    async fn upsert_batch(&self, events: &[ProcessedEvent]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            let e = &event.normalized;
            sqlx::query(
                r#"
                INSERT INTO usage_events (
                    event_id, tenant_id, timestamp, user_id, service_type, service_provider,
                    event_type, metrics, metadata, tags, billing_info, total_cost, status,
                    error_message, retry_count, session_id, request_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                ON CONFLICT (event_id) DO UPDATE SET
                    status = EXCLUDED.status,
                    billing_info = EXCLUDED.billing_info,
                    total_cost = EXCLUDED.total_cost,
                    error_message = EXCLUDED.error_message,
                    retry_count = EXCLUDED.retry_count,
                    updated_at = now()
                "#,
            )
            .bind(e.event_id)
            .bind(&e.tenant_id)
            .bind(e.timestamp)
            .bind(&e.user_id)
            .bind(e.service_type)
            .bind(&e.service_provider)
            .bind(&e.event_type)
            .bind(serde_json::to_value(&e.metrics).unwrap_or_default())
            .bind(serde_json::to_value(&e.metadata).unwrap_or_default())
            .bind(&e.tags)
            .bind(&event.billing_info)
            .bind(event.total_cost)
            .bind(event.status)
            .bind(&event.error_message)
            .bind(event.retry_count)
            .bind(&e.session_id)
            .bind(&e.request_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    async fn route_failure(&self, event: ProcessedEvent) {
        if event.retry_count < self.max_retry_count as i32 {
            let payload = serde_json::to_string(&event.normalized).unwrap_or_default();
            let _ = self.queue.requeue(&self.queue_name, &payload).await;
            return;
        }

        let dead_letter_payload = json!({
            "event": event.normalized,
            "error_message": event.error_message,
            "dead_letter_at": OffsetDateTime::now_utc(),
        });
        if let Ok(payload) = serde_json::to_string(&dead_letter_payload) {
            if let Err(err) = self.queue.push(DEAD_LETTER_QUEUE, &payload).await {
                error!(error = %err, event_id = %event.normalized.event_id, "failed to push to dead letter queue");
            }
        }
    }
}

/// Derive fields the validator leaves to the processor: token totals,
/// session duration, and a `processed_at` stamp.
fn enrich(event: &mut NormalizedEvent) {
    event
        .metadata
        .insert("processed_at".to_string(), json!(OffsetDateTime::now_utc()));

    let input_tokens = event.metrics.get("input_tokens").and_then(Value::as_u64);
    let output_tokens = event.metrics.get("output_tokens").and_then(Value::as_u64);
    if let (Some(input), Some(output)) = (input_tokens, output_tokens) {
        event
            .metrics
            .insert("total_tokens".to_string(), json!(input + output));
    }

    if let (Some(start), Some(end)) = (
        event.metrics.get("session_start").and_then(Value::as_str),
        event.metrics.get("session_end").and_then(Value::as_str),
    ) {
        if let (Ok(start), Ok(end)) = (
            OffsetDateTime::parse(start, &time::format_description::well_known::Rfc3339),
            OffsetDateTime::parse(end, &time::format_description::well_known::Rfc3339),
        ) {
            let duration_ms = (end - start).whole_milliseconds();
            event
                .metrics
                .insert("session_duration_ms".to_string(), json!(duration_ms));
        }
    }
}
