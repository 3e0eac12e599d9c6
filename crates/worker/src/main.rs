// Worker clippy configuration
#![allow(clippy::too_many_arguments)]

//! Commitment ingestion and lifecycle engine — background worker.
//!
//! Scheduled jobs:
//! - Webhook intake queue drain (every minute)
//! - Webhook intake cleanup (daily at 3:00 AM UTC)
//! - Trigger reconciliation health check (every 30 minutes)
//! - Heartbeat (every 5 minutes)

mod reconciliation;
mod webhook_processor;

use std::sync::Arc;
use std::time::Duration;

use commitly_core::aggregator::MailAggregator;
use commitly_core::commitment::{CommitmentStore, PgCommitmentStore};
use commitly_core::config::Config;
use commitly_core::connection::{ConnectionStore, PgConnectionStore};
use commitly_core::credit::{CreditStore, PgCreditStore};
use commitly_core::extraction::{Extractor, UserProfileProvider};
use commitly_core::shadow::RedisShadowStore;
use commitly_core::trigger::TriggerProvider;
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

/// Mailbox aggregator, extraction model, trigger provisioner, and user
/// profile lookup are opaque third-party boundaries (spec.md §1) with
/// no in-scope concrete implementation. Left unconfigured here; a
/// deployment wires real adapters in before constructing `WorkerDeps`.
struct WorkerDeps {
    pool: sqlx::PgPool,
    config: Config,
    commitments: Arc<dyn CommitmentStore>,
    connections: Arc<dyn ConnectionStore>,
    credits: Arc<dyn CreditStore>,
    aggregator: Option<Arc<dyn MailAggregator>>,
    extractor: Option<Arc<dyn Extractor>>,
    triggers: Option<Arc<dyn TriggerProvider>>,
    profiles: Option<Arc<dyn UserProfileProvider>>,
}

async fn create_db_pool(database_url: &str) -> anyhow::Result<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    info!("database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("starting commitment engine worker");

    let config = Config::from_env()?;
    let pool = create_db_pool(&config.database_url).await?;

    let shadow = Arc::new(RedisShadowStore::new(&config.redis_url)?);
    let commitments: Arc<dyn CommitmentStore> = Arc::new(PgCommitmentStore::new(pool.clone(), shadow));
    let connections: Arc<dyn ConnectionStore> = Arc::new(PgConnectionStore::new(pool.clone()));
    let credits: Arc<dyn CreditStore> = Arc::new(PgCreditStore::new(pool.clone()));

    let deps = Arc::new(WorkerDeps {
        pool: pool.clone(),
        config: config.clone(),
        commitments,
        connections,
        credits,
        aggregator: None,
        extractor: None,
        triggers: None,
        profiles: None,
    });

    if deps.aggregator.is_none() {
        warn!("no mailbox aggregator/extractor SDK configured; webhook drain job will idle");
    }

    let scheduler = JobScheduler::new().await?;

    // Job 1: drain the webhook intake queue (every minute).
    let drain_deps = deps.clone();
    scheduler
        .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
            let deps = drain_deps.clone();
            Box::pin(async move {
                let (Some(aggregator), Some(extractor), Some(profiles)) =
                    (deps.aggregator.as_ref(), deps.extractor.as_ref(), deps.profiles.as_ref())
                else {
                    return;
                };
                webhook_processor::drain_queue(
                    &deps.pool,
                    aggregator.as_ref(),
                    extractor.as_ref(),
                    deps.commitments.as_ref(),
                    deps.credits.as_ref(),
                    profiles.as_ref(),
                    deps.connections.as_ref(),
                    deps.triggers.as_deref(),
                    &deps.config,
                    50,
                )
                .await;
            })
        })?)
        .await?;
    info!("scheduled: webhook queue drain (every minute)");

    // Job 2: cleanup old webhook intake rows (daily at 3:00 AM UTC).
    let cleanup_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let pool = cleanup_pool.clone();
            Box::pin(async move {
                webhook_processor::cleanup_old_intake(&pool, 7).await;
            })
        })?)
        .await?;
    info!("scheduled: webhook intake cleanup (daily at 3:00 AM UTC)");

    // Job 3: trigger reconciliation health check (every 30 minutes).
    let reconcile_deps = deps.clone();
    scheduler
        .add(Job::new_async("0 */30 * * * *", move |_uuid, _l| {
            let deps = reconcile_deps.clone();
            Box::pin(async move {
                let Some(triggers) = deps.triggers.as_ref() else {
                    return;
                };
                reconciliation::run_health_check(
                    &deps.pool,
                    deps.connections.as_ref(),
                    triggers.as_ref(),
                    deps.config.trigger_lock_staleness_seconds,
                )
                .await;
            })
        })?)
        .await?;
    info!("scheduled: trigger reconciliation health check (every 30 minutes)");

    // Job 4: heartbeat (every 5 minutes).
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("scheduled: heartbeat (every 5 minutes)");

    info!("starting job scheduler");
    scheduler.start().await?;

    info!("commitment engine worker started successfully with 4 scheduled jobs");

    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
