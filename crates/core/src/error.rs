//! Domain error taxonomy for the commitment ingestion and lifecycle engine.
//!
//! Mirrors the teacher's `BillingError` shape: a single `thiserror` enum,
//! one variant per error kind in spec.md §7, with `From` impls at each
//! crate boundary translating these into transport-specific responses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("user {0} does not exist")]
    UserMissing(String),

    #[error("credits exhausted for user {0}")]
    CreditsExhausted(String),

    #[error("aggregator call failed transiently: {0}")]
    AggregatorTransient(String),

    #[error("aggregator returned a malformed response: {0}")]
    AggregatorFatal(String),

    #[error("extraction output failed schema validation: {0}")]
    ExtractionInvalid(String),

    #[error("commitment {0} not found")]
    NotFound(String),

    #[error("shadow store unavailable: {0}")]
    ShadowStoreUnavailable(String),

    #[error("trigger-creation lock is held by another process")]
    LockHeld,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("shadow store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
