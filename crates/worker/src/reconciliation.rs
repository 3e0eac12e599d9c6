//! Trigger reconciliation health check (spec.md §4.7): the
//! "reconnection fast path" — any otherwise-active connection missing
//! one of its two triggers gets `ensure_triggers` re-run.

use commitly_core::connection::ConnectionStore;
use commitly_core::trigger::{ensure_triggers, TriggerProvider};
use sqlx::PgPool;
use time::Duration;
use tracing::{info, warn};

#[derive(Debug, sqlx::FromRow)]
struct ActiveConnection {
    user_id: String,
    entity_id: String,
}

pub async fn run_health_check(
    pool: &PgPool,
    connections: &dyn ConnectionStore,
    triggers: &dyn TriggerProvider,
    trigger_lock_staleness_seconds: i64,
) {
    let rows: Vec<ActiveConnection> = match sqlx::query_as(
        r#"
        SELECT user_id, entity_id
        FROM user_connection_state
        WHERE connection_enabled = true
          AND entity_id IS NOT NULL
          AND (inbox_trigger_id IS NULL OR sent_trigger_id IS NULL)
        "#,
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "trigger health check query failed");
            return;
        }
    };

    if rows.is_empty() {
        return;
    }

    info!(count = rows.len(), "trigger health check found connections missing a trigger");

    for row in rows {
        let staleness = Duration::seconds(trigger_lock_staleness_seconds);
        match ensure_triggers(connections, triggers, &row.user_id, &row.entity_id, staleness).await {
            Ok(_) => info!(user_id = %row.user_id, "triggers reconciled"),
            Err(e) => warn!(user_id = %row.user_id, error = %e, "trigger reconciliation failed"),
        }
    }
}
