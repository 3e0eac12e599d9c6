//! Commitment persistence (C4): Postgres-backed CRUD plus soft-delete
//! through the TTL shadow store. Grounded in spec.md §4.4 and the
//! teacher's `sqlx::PgPool`-per-service pattern.

use super::filters::CommitmentFilters;
use super::model::Commitment;
use crate::error::{CoreError, CoreResult};
use crate::shadow::ShadowStore;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

#[async_trait]
pub trait CommitmentStore: Send + Sync {
    async fn upsert(&self, commitment: &Commitment) -> CoreResult<Commitment>;
    async fn get(&self, user_id: &str, id: Uuid) -> CoreResult<Option<Commitment>>;
    async fn get_by_message_id(&self, user_id: &str, message_id: &str) -> CoreResult<Option<Commitment>>;
    async fn mark_completed(&self, user_id: &str, id: Uuid, completed: bool) -> CoreResult<Commitment>;
    async fn delete(&self, user_id: &str, id: Uuid) -> CoreResult<()>;
    async fn restore(&self, user_id: &str, id: Uuid) -> CoreResult<Commitment>;
    async fn list_deleted(&self, user_id: &str, limit: i64) -> CoreResult<Vec<crate::shadow::ShadowEntry>>;
    async fn query(&self, user_id: &str, filters: &CommitmentFilters) -> CoreResult<Vec<Commitment>>;
}

pub struct PgCommitmentStore {
    pool: PgPool,
    shadow: Arc<dyn ShadowStore>,
}

impl PgCommitmentStore {
    pub fn new(pool: PgPool, shadow: Arc<dyn ShadowStore>) -> Self {
        Self { pool, shadow }
    }
}

#[async_trait]
impl CommitmentStore for PgCommitmentStore {
    async fn upsert(&self, commitment: &Commitment) -> CoreResult<Commitment> {
        let row = sqlx::query_as::<_, Commitment>(
            r#"
            INSERT INTO commitments (
                id, user_id, what, to_whom, given_by,
                deadline_raw, deadline_iso, status, days_overdue, overdue_flag,
                priority, commitment_type, estimated_hours, confidence, sender_role,
                direction, assigned_to_me, message_id, email_subject, email_sender,
                email_sender_name, email_date, source_email_folder,
                completed, completed_at, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
            )
            ON CONFLICT (id) DO UPDATE SET
                what = EXCLUDED.what,
                to_whom = EXCLUDED.to_whom,
                given_by = EXCLUDED.given_by,
                deadline_raw = EXCLUDED.deadline_raw,
                deadline_iso = EXCLUDED.deadline_iso,
                status = EXCLUDED.status,
                days_overdue = EXCLUDED.days_overdue,
                overdue_flag = EXCLUDED.overdue_flag,
                priority = EXCLUDED.priority,
                commitment_type = EXCLUDED.commitment_type,
                estimated_hours = EXCLUDED.estimated_hours,
                confidence = EXCLUDED.confidence,
                sender_role = EXCLUDED.sender_role,
                completed = EXCLUDED.completed,
                completed_at = EXCLUDED.completed_at,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(commitment.id)
        .bind(&commitment.user_id)
        .bind(&commitment.what)
        .bind(&commitment.to_whom)
        .bind(&commitment.given_by)
        .bind(&commitment.deadline_raw)
        .bind(commitment.deadline_iso)
        .bind(commitment.status)
        .bind(commitment.days_overdue)
        .bind(commitment.overdue_flag)
        .bind(commitment.priority)
        .bind(&commitment.commitment_type)
        .bind(commitment.estimated_hours)
        .bind(commitment.confidence)
        .bind(commitment.sender_role)
        .bind(commitment.direction)
        .bind(commitment.assigned_to_me)
        .bind(&commitment.message_id)
        .bind(&commitment.email_subject)
        .bind(&commitment.email_sender)
        .bind(&commitment.email_sender_name)
        .bind(commitment.email_date)
        .bind(&commitment.source_email_folder)
        .bind(commitment.completed)
        .bind(commitment.completed_at)
        .bind(commitment.created_at)
        .bind(commitment.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get(&self, user_id: &str, id: Uuid) -> CoreResult<Option<Commitment>> {
        let row = sqlx::query_as::<_, Commitment>(
            "SELECT * FROM commitments WHERE user_id = $1 AND id = $2",
        )
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_by_message_id(&self, user_id: &str, message_id: &str) -> CoreResult<Option<Commitment>> {
        let row = sqlx::query_as::<_, Commitment>(
            "SELECT * FROM commitments WHERE user_id = $1 AND message_id = $2",
        )
        .bind(user_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_completed(&self, user_id: &str, id: Uuid, completed: bool) -> CoreResult<Commitment> {
        // Toggling completed=true -> false restores status="active" and
        // clears completed_at (spec.md §8 "mark_completed round-trip").
        let row = sqlx::query_as::<_, Commitment>(
            r#"
            UPDATE commitments
            SET completed = $3,
                completed_at = CASE WHEN $3 THEN NOW() ELSE NULL END,
                status = CASE WHEN $3 THEN 'completed' ELSE 'active' END,
                updated_at = NOW()
            WHERE user_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(id)
        .bind(completed)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> CoreResult<()> {
        let existing = self
            .get(user_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

        let deleted_at = OffsetDateTime::now_utc();
        if let Err(e) = self.shadow.put(user_id, &existing, deleted_at).await {
            // Best-effort: the shadow backup is a convenience, not a
            // correctness requirement (spec.md §7 "ShadowStoreUnavailable").
            warn!(error = %e, commitment_id = %id, "shadow store unavailable, deleting without backup");
        }

        sqlx::query("DELETE FROM commitments WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn restore(&self, user_id: &str, id: Uuid) -> CoreResult<Commitment> {
        let entry = self
            .shadow
            .take(user_id, &id.to_string())
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

        let mut restored = entry.commitment;
        restored.completed = false;
        restored.status = super::model::CommitmentStatus::Active;
        restored.completed_at = None;
        restored.updated_at = OffsetDateTime::now_utc();

        self.upsert(&restored).await
    }

    async fn list_deleted(&self, user_id: &str, limit: i64) -> CoreResult<Vec<crate::shadow::ShadowEntry>> {
        self.shadow.list(user_id, limit).await
    }

    async fn query(&self, user_id: &str, filters: &CommitmentFilters) -> CoreResult<Vec<Commitment>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM commitments WHERE user_id = ");
        qb.push_bind(user_id);

        if filters.only_completed {
            qb.push(" AND completed = true");
        } else if !filters.include_completed {
            qb.push(" AND completed = false");
        }
        // `status` is NOT pushed down: the stored column is cached at
        // extraction time, so an `active` row whose deadline has since
        // passed is stale until `query::fetch_commitments` recomputes it.
        // Filtering on the stored value here would drop genuinely
        // overdue/due-today commitments before they're ever recomputed
        // (spec.md §4.4). `query.rs::apply_in_process_filters` is the
        // sole status gate.
        if let Some(role) = &filters.sender_role {
            qb.push(" AND sender_role IN (");
            let mut sep = qb.separated(", ");
            for r in role {
                sep.push_bind(r);
            }
            qb.push(")");
        }
        if let Some(direction) = &filters.direction {
            qb.push(" AND direction IN (");
            let mut sep = qb.separated(", ");
            for d in direction {
                sep.push_bind(d);
            }
            qb.push(")");
        }
        if let Some(assigned) = filters.assigned_to_me {
            qb.push(" AND assigned_to_me = ").push_bind(assigned);
        }
        if let Some(has_deadline) = filters.has_deadline {
            qb.push(if has_deadline {
                " AND deadline_iso IS NOT NULL"
            } else {
                " AND deadline_iso IS NULL"
            });
        }
        if let Some(text) = &filters.search_text {
            let pattern = format!("%{text}%");
            qb.push(" AND (what ILIKE ").push_bind(pattern.clone());
            qb.push(" OR email_subject ILIKE ").push_bind(pattern);
            qb.push(")");
        }

        // No ORDER BY / LIMIT here: `priority` is stored as plain text
        // (alphabetical, not severity-ordered) and `days_overdue` is
        // cached at extraction time same as `status`. Sorting and the
        // result limit are applied in-process by `query.rs`, after
        // `status::recompute`, using `status::priority_score` /
        // `status::urgency_score` (spec.md §4.2).
        let rows = qb.build_query_as::<Commitment>().fetch_all(&self.pool).await?;
        Ok(rows)
    }
}
