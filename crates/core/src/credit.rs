//! Metered credit accounting (C3): token counts -> credits, atomic
//! debit, auto-pause hook. Ported from `credit_engine.py`; the
//! Firestore `@firestore.transactional` closure becomes a `SELECT ...
//! FOR UPDATE` row lock inside an explicit `sqlx` transaction.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};

/// `credits_spent(in, out) = round(in/in_per_credit + out/out_per_credit + 1e-8, 2)`
/// (spec.md §4.3). Negative/missing token counts normalize to 0.
pub fn credits_spent(input_tokens: i64, output_tokens: i64, input_per_credit: f64, output_per_credit: f64) -> f64 {
    let input_tokens = input_tokens.max(0) as f64;
    let output_tokens = output_tokens.max(0) as f64;
    let raw = input_tokens / input_per_credit + output_tokens / output_per_credit;
    ((raw + 1e-8) * 100.0).round() / 100.0
}

#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn initialize_if_missing(&self, user_id: &str, default_total: f64) -> CoreResult<()>;
    /// Debits `spent` credits, clamping `remaining` at 0. Returns the new
    /// remaining balance and whether this debit just exhausted credits
    /// (crossed from >0 to <=0), which the caller uses to fire the
    /// post-commit pause hook exactly once.
    async fn deduct(&self, user_id: &str, spent: f64) -> CoreResult<DeductOutcome>;
    async fn has_credits(&self, user_id: &str) -> CoreResult<bool>;
    async fn status(&self, user_id: &str) -> CoreResult<CreditStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeductOutcome {
    pub remaining: f64,
    pub just_exhausted: bool,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CreditStatus {
    pub total: f64,
    pub used: f64,
    pub remaining: f64,
    pub percentage_used: f64,
}

pub struct PgCreditStore {
    pool: PgPool,
}

impl PgCreditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditStore for PgCreditStore {
    async fn initialize_if_missing(&self, user_id: &str, default_total: f64) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_connection_state (user_id, credits_total, credits_used, credits_remaining)
            VALUES ($1, $2, 0, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(default_total)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deduct(&self, user_id: &str, spent: f64) -> CoreResult<DeductOutcome> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(f64, f64)> = sqlx::query_as(
            "SELECT credits_remaining, credits_used FROM user_connection_state WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (remaining, used) = row.ok_or_else(|| CoreError::UserMissing(user_id.to_string()))?;

        let new_remaining = (remaining - spent).max(0.0);
        let new_used = used + spent;
        let just_exhausted = remaining > 0.0 && new_remaining <= 0.0;

        sqlx::query(
            "UPDATE user_connection_state SET credits_remaining = $2, credits_used = $3 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(new_remaining)
        .bind(new_used)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if just_exhausted {
            // Best-effort, post-commit: never roll back the debit itself
            // (spec.md §5 "Credit transaction").
            info!(user_id, "credits exhausted, pause hook will fire");
        }

        Ok(DeductOutcome {
            remaining: new_remaining,
            just_exhausted,
        })
    }

    async fn has_credits(&self, user_id: &str) -> CoreResult<bool> {
        let row: Option<(f64,)> =
            sqlx::query_as("SELECT credits_remaining FROM user_connection_state WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(remaining,)| remaining > 0.0).unwrap_or(false))
    }

    async fn status(&self, user_id: &str) -> CoreResult<CreditStatus> {
        let row: Option<(f64, f64, f64)> = sqlx::query_as(
            "SELECT credits_total, credits_used, credits_remaining FROM user_connection_state WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (total, used, remaining) = row.ok_or_else(|| CoreError::UserMissing(user_id.to_string()))?;
        let percentage_used = if total > 0.0 { (used / total) * 100.0 } else { 0.0 };

        Ok(CreditStatus {
            total,
            used,
            remaining,
            percentage_used,
        })
    }
}

/// Called once, post-commit, when a debit crosses credits to zero or
/// below. `pause` is the trigger-provisioner's `disable` operation;
/// kept as an injected async closure so the credit module stays free of
/// a direct dependency on `core::trigger`.
pub async fn fire_pause_hook_if_exhausted<F, Fut>(outcome: DeductOutcome, user_id: &str, pause: F)
where
    F: FnOnce(&str) -> Fut,
    Fut: std::future::Future<Output = CoreResult<()>>,
{
    if !outcome.just_exhausted {
        return;
    }
    if let Err(e) = pause(user_id).await {
        warn!(user_id, error = %e, "failed to pause triggers after credit exhaustion");
    } else {
        info!(user_id, "triggers paused after credit exhaustion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credits_spent_matches_formula() {
        // 2000 input tokens / 1000 per credit = 2.0; 500 output / 500 = 1.0.
        assert_eq!(credits_spent(2000, 500, 1000.0, 500.0), 3.0);
    }

    #[test]
    fn credits_spent_normalizes_negative_tokens_to_zero() {
        assert_eq!(credits_spent(-100, -100, 1000.0, 500.0), 0.0);
    }

    #[test]
    fn credits_spent_rounds_to_two_decimals() {
        let spent = credits_spent(333, 111, 1000.0, 500.0);
        assert_eq!(spent, 0.56);
    }

    #[tokio::test]
    async fn pause_hook_fires_only_when_just_exhausted() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();

        fire_pause_hook_if_exhausted(
            DeductOutcome { remaining: 0.0, just_exhausted: true },
            "user-1",
            |_u| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        fire_pause_hook_if_exhausted(
            DeductOutcome { remaining: 5.0, just_exhausted: false },
            "user-1",
            |_u| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    proptest::proptest! {
        // Non-negative token counts always yield a non-negative, 2-decimal
        // credit charge (spec.md §4.3) regardless of the magnitude.
        #[test]
        fn credits_spent_is_never_negative_and_rounds_to_cents(
            input_tokens in 0i64..1_000_000,
            output_tokens in 0i64..1_000_000,
        ) {
            let spent = credits_spent(input_tokens, output_tokens, 1000.0, 500.0);
            proptest::prop_assert!(spent >= 0.0);
            proptest::prop_assert_eq!((spent * 100.0).round(), spent * 100.0);
        }

        // Negative token counts normalize to 0, so the result never
        // depends on how far negative they go.
        #[test]
        fn credits_spent_normalizes_negative_tokens_to_zero(
            input_tokens in -1_000_000i64..0,
            output_tokens in -1_000_000i64..0,
        ) {
            let spent = credits_spent(input_tokens, output_tokens, 1000.0, 500.0);
            proptest::prop_assert_eq!(spent, 0.0);
        }
    }
}
