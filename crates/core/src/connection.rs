//! Connection state machine (C6): per-user backfill/trigger lifecycle.
//! Ported from `connection_state_manager.py`'s "PHASE 4B dual-trigger"
//! design; lock fields live directly on `user_connection_state` per
//! SPEC_FULL.md §9's redesign (a `ConnectionLocks` sub-struct with
//! field-level update methods, not a single blob merge).

use crate::error::CoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserConnectionState {
    pub user_id: String,
    pub first_connected_at: Option<OffsetDateTime>,
    pub connection_enabled: bool,
    pub entity_id: Option<String>,

    pub inbox_trigger_id: Option<String>,
    pub sent_trigger_id: Option<String>,

    pub initial_sync_completed: bool,
    pub initial_sync_started_at: Option<OffsetDateTime>,
    pub initial_sync_completed_at: Option<OffsetDateTime>,

    pub sync_in_progress: bool,
    pub trigger_creation_in_progress: bool,
    pub trigger_creation_started_at: Option<OffsetDateTime>,

    pub total_commitments_found: i64,
}

impl UserConnectionState {
    /// `should_run_initial_sync(user) = (first_connected_at is null)`
    /// (spec.md §4.6). `first_connected_at` is never cleared by
    /// disconnect, so backfill never repeats across reconnects.
    pub fn should_run_initial_sync(&self) -> bool {
        self.first_connected_at.is_none()
    }

    pub fn trigger_lock_is_stale(&self, now: OffsetDateTime, staleness: Duration) -> bool {
        match self.trigger_creation_started_at {
            Some(started) => now - started > staleness,
            None => true,
        }
    }
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> CoreResult<Option<UserConnectionState>>;
    async fn mark_first_connection(&self, user_id: &str, entity_id: &str) -> CoreResult<()>;
    async fn mark_reconnection(&self, user_id: &str, entity_id: &str) -> CoreResult<()>;
    async fn mark_disconnection(&self, user_id: &str) -> CoreResult<()>;

    async fn acquire_sync_lock(&self, user_id: &str) -> CoreResult<bool>;
    async fn release_sync_lock(&self, user_id: &str) -> CoreResult<()>;

    /// Acquires the trigger-creation lock, force-clearing it first if it
    /// is older than `staleness` (spec.md §4.6 stale-lock recovery).
    async fn acquire_trigger_lock(&self, user_id: &str, staleness: Duration) -> CoreResult<bool>;
    async fn release_trigger_lock(&self, user_id: &str) -> CoreResult<()>;

    async fn set_triggers(&self, user_id: &str, inbox_trigger_id: &str, sent_trigger_id: &str) -> CoreResult<()>;
    async fn complete_initial_sync(&self, user_id: &str, total_commitments_found: i64) -> CoreResult<()>;
}

pub struct PgConnectionStore {
    pool: PgPool,
}

impl PgConnectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn get(&self, user_id: &str) -> CoreResult<Option<UserConnectionState>> {
        let row = sqlx::query_as::<_, UserConnectionState>(
            "SELECT * FROM user_connection_state WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_first_connection(&self, user_id: &str, entity_id: &str) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE user_connection_state
            SET first_connected_at = NOW(), connection_enabled = true, entity_id = $2
            WHERE user_id = $1 AND first_connected_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;
        info!(user_id, "first connection recorded");
        Ok(())
    }

    async fn mark_reconnection(&self, user_id: &str, entity_id: &str) -> CoreResult<()> {
        // `first_connected_at` is preserved; only the live connection
        // fields are refreshed (spec.md §4.6).
        sqlx::query(
            "UPDATE user_connection_state SET connection_enabled = true, entity_id = $2 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;
        info!(user_id, "reconnection recorded");
        Ok(())
    }

    async fn mark_disconnection(&self, user_id: &str) -> CoreResult<()> {
        // Preserves first_connected_at; clears the live-connection fields
        // (spec.md §4.6 "Disconnect semantics").
        sqlx::query(
            r#"
            UPDATE user_connection_state
            SET connection_enabled = false, inbox_trigger_id = NULL, sent_trigger_id = NULL
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        info!(user_id, "disconnection recorded");
        Ok(())
    }

    async fn acquire_sync_lock(&self, user_id: &str) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_connection_state
            SET sync_in_progress = true, initial_sync_started_at = NOW()
            WHERE user_id = $1 AND sync_in_progress = false
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_sync_lock(&self, user_id: &str) -> CoreResult<()> {
        sqlx::query("UPDATE user_connection_state SET sync_in_progress = false WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn acquire_trigger_lock(&self, user_id: &str, staleness: Duration) -> CoreResult<bool> {
        let staleness_secs = staleness.whole_seconds();
        let result = sqlx::query(
            r#"
            UPDATE user_connection_state
            SET trigger_creation_in_progress = true, trigger_creation_started_at = NOW()
            WHERE user_id = $1
              AND (
                  trigger_creation_in_progress = false
                  OR trigger_creation_started_at < NOW() - make_interval(secs => $2)
              )
            "#,
        )
        .bind(user_id)
        .bind(staleness_secs as f64)
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() == 1;
        if acquired {
            warn!(user_id, "trigger lock acquired (force-clear if previously stale)");
        }
        Ok(acquired)
    }

    async fn release_trigger_lock(&self, user_id: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE user_connection_state SET trigger_creation_in_progress = false WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_triggers(&self, user_id: &str, inbox_trigger_id: &str, sent_trigger_id: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE user_connection_state SET inbox_trigger_id = $2, sent_trigger_id = $3 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(inbox_trigger_id)
        .bind(sent_trigger_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_initial_sync(&self, user_id: &str, total_commitments_found: i64) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE user_connection_state
            SET initial_sync_completed = true,
                initial_sync_completed_at = NOW(),
                total_commitments_found = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(total_commitments_found)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn state(first_connected_at: Option<OffsetDateTime>) -> UserConnectionState {
        UserConnectionState {
            user_id: "u1".into(),
            first_connected_at,
            connection_enabled: true,
            entity_id: None,
            inbox_trigger_id: None,
            sent_trigger_id: None,
            initial_sync_completed: false,
            initial_sync_started_at: None,
            initial_sync_completed_at: None,
            sync_in_progress: false,
            trigger_creation_in_progress: false,
            trigger_creation_started_at: None,
            total_commitments_found: 0,
        }
    }

    #[test]
    fn should_run_initial_sync_iff_never_connected() {
        assert!(state(None).should_run_initial_sync());
        assert!(!state(Some(datetime!(2025-11-24 09:00:00 UTC))).should_run_initial_sync());
    }

    #[test]
    fn trigger_lock_stale_after_five_minutes() {
        let mut s = state(None);
        let started = datetime!(2025-11-24 09:00:00 UTC);
        s.trigger_creation_started_at = Some(started);

        let just_under = started + Duration::minutes(4) + Duration::seconds(59);
        assert!(!s.trigger_lock_is_stale(just_under, Duration::minutes(5)));

        let just_over = started + Duration::minutes(5) + Duration::seconds(1);
        assert!(s.trigger_lock_is_stale(just_over, Duration::minutes(5)));
    }

    #[test]
    fn trigger_lock_with_no_started_at_is_stale() {
        let s = state(None);
        assert!(s.trigger_lock_is_stale(datetime!(2025-11-24 09:00:00 UTC), Duration::minutes(5)));
    }
}
