//! Application state, trimmed down from the teacher's sprawling
//! `AppState` (GeoIP, Fly.io, WebSocket, MCP proxy, billing) to exactly
//! what the commitment engine's HTTP surface touches: the three core
//! stores, config, and the JWT boundary.

use sqlx::PgPool;
use std::sync::Arc;

use commitly_core::aggregator::MailAggregator;
use commitly_core::commitment::{CommitmentStore, PgCommitmentStore};
use commitly_core::connection::{ConnectionStore, PgConnectionStore};
use commitly_core::credit::{CreditStore, PgCreditStore};
use commitly_core::extraction::Extractor;
use commitly_core::shadow::{RedisShadowStore, ShadowStore};
use commitly_core::trigger::TriggerProvider;

use crate::config::ApiConfig;

/// The mailbox aggregator, extraction model, and trigger provisioner
/// are opaque third-party SDK boundaries (spec.md §1) with no in-scope
/// concrete implementation — analogous to the teacher's `Option<FlyClient>`
/// and feature-gated billing service. Left `None` here; a deployment
/// wires a concrete adapter in by constructing `AppState` directly.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: ApiConfig,
    pub commitments: Arc<dyn CommitmentStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub credits: Arc<dyn CreditStore>,
    pub shadow: Arc<dyn ShadowStore>,
    pub aggregator: Option<Arc<dyn MailAggregator>>,
    pub extractor: Option<Arc<dyn Extractor>>,
    pub triggers: Option<Arc<dyn TriggerProvider>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: ApiConfig) -> anyhow::Result<Self> {
        let shadow: Arc<dyn ShadowStore> = Arc::new(RedisShadowStore::new(&config.core.redis_url)?);
        let commitments: Arc<dyn CommitmentStore> =
            Arc::new(PgCommitmentStore::new(pool.clone(), shadow.clone()));
        let connections: Arc<dyn ConnectionStore> = Arc::new(PgConnectionStore::new(pool.clone()));
        let credits: Arc<dyn CreditStore> = Arc::new(PgCreditStore::new(pool.clone()));

        tracing::info!("commitment store initialized");
        tracing::info!("connection store initialized");
        tracing::info!("credit store initialized");
        tracing::info!("redis shadow store initialized");
        tracing::warn!("no mailbox aggregator/extractor/trigger SDK configured; backfill and live sync are inert until one is wired in");

        Ok(Self {
            pool,
            config,
            commitments,
            connections,
            credits,
            shadow,
            aggregator: None,
            extractor: None,
            triggers: None,
        })
    }
}
