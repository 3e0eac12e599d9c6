//! Commitment ingestion and lifecycle engine.
//!
//! Pure domain logic (deadline normalization, status calculation, the
//! connection state machine) plus async store/client traits with
//! `sqlx`/`redis`-backed implementations. No HTTP: that surface lives
//! in `crates/api`.

pub mod aggregator;
pub mod commitment;
pub mod config;
pub mod connection;
pub mod credit;
pub mod deadline;
pub mod error;
pub mod extraction;
pub mod mailparse;
pub mod pipeline;
pub mod query;
pub mod shadow;
pub mod status;
pub mod trigger;

pub use config::Config;
pub use error::{CoreError, CoreResult};

/// Runs the embedded schema migrations. Stands in for
/// `plexmcp_shared::run_migrations`, which is not part of this
/// retrieval pack.
pub async fn run_migrations(pool: &sqlx::PgPool) -> CoreResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| CoreError::Database(sqlx::Error::Migrate(Box::new(e))))
}
