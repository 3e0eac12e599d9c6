//! Drains the webhook intake queue (§4.11). Grounded in the teacher's
//! `Job::new_async` cron pattern (`main.rs`): one scheduled tick claims
//! and processes whatever is queued, then stops when the queue is dry.

use commitly_core::aggregator::MailAggregator;
use commitly_core::commitment::CommitmentStore;
use commitly_core::config::Config;
use commitly_core::connection::ConnectionStore;
use commitly_core::credit::CreditStore;
use commitly_core::extraction::{Extractor, UserProfileProvider};
use commitly_core::pipeline::live::claim_and_process;
use commitly_core::trigger::TriggerProvider;
use sqlx::PgPool;
use tracing::{info, warn};

/// Drains the queue until empty or `max_items` is reached, whichever
/// comes first, so one cron tick can't run unbounded.
#[allow(clippy::too_many_arguments)]
pub async fn drain_queue(
    pool: &PgPool,
    aggregator: &dyn MailAggregator,
    extractor: &dyn Extractor,
    commitments: &dyn CommitmentStore,
    credits: &dyn CreditStore,
    profiles: &dyn UserProfileProvider,
    connections: &dyn ConnectionStore,
    triggers: Option<&dyn TriggerProvider>,
    config: &Config,
    max_items: usize,
) {
    let mut processed = 0;
    loop {
        if processed >= max_items {
            info!(processed, "webhook queue drain hit max_items for this tick");
            break;
        }
        match claim_and_process(pool, aggregator, extractor, commitments, credits, profiles, connections, triggers, config).await {
            Ok(true) => processed += 1,
            Ok(false) => break,
            Err(e) => {
                warn!(error = %e, "webhook item failed, continuing to next");
                processed += 1;
            }
        }
    }
    if processed > 0 {
        info!(processed, "webhook queue drain cycle complete");
    }
}

/// Deletes terminal (`done`/`error`) rows older than `retain_days`.
pub async fn cleanup_old_intake(pool: &PgPool, retain_days: i64) {
    let result = sqlx::query(
        r#"
        DELETE FROM webhook_intake
        WHERE status IN ('done', 'error')
          AND processed_at < NOW() - make_interval(days => $1)
        "#,
    )
    .bind(retain_days as i32)
    .execute(pool)
    .await;

    match result {
        Ok(r) => info!(deleted = r.rows_affected(), "webhook intake cleanup complete"),
        Err(e) => warn!(error = %e, "webhook intake cleanup failed"),
    }
}
