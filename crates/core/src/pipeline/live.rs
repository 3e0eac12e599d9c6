//! Live pipeline (C9) plus the webhook intake queue (§4.11). The HTTP
//! layer calls `enqueue` to ack immediately; `crates/worker` calls
//! `claim_and_process` in a loop to drain the queue. The atomic claim
//! is the teacher's `stripe_webhook_events` `INSERT ... ON CONFLICT ...
//! RETURNING` pattern (`webhooks.rs`), keyed on `(user_id, message_id)`
//! instead of `stripe_event_id`.

use crate::aggregator::MailAggregator;
use crate::commitment::CommitmentStore;
use crate::config::Config;
use crate::connection::ConnectionStore;
use crate::credit::{credits_spent, fire_pause_hook_if_exhausted, CreditStore};
use crate::error::{CoreError, CoreResult};
use crate::extraction::{extract_with_retry, EmailInput, Extractor, Folder, UserContext, UserProfileProvider};
use crate::mailparse::extract_email_text;
use crate::status;
use crate::trigger::{self, TriggerProvider};
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WebhookPayload {
    pub user_id: String,
    pub connected_account_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    SkippedNoCredits,
}

/// Steps 1-3 of spec.md §4.9: validate, gate on credits, enqueue.
pub async fn enqueue(pool: &PgPool, credits: &dyn CreditStore, payload: &WebhookPayload) -> CoreResult<EnqueueOutcome> {
    if payload.user_id.is_empty() || payload.connected_account_id.is_empty() || payload.message_id.is_empty() {
        return Err(CoreError::ExtractionInvalid("webhook payload missing required fields".into()));
    }

    if !credits.has_credits(&payload.user_id).await? {
        info!(user_id = %payload.user_id, "webhook skipped: no credits");
        return Ok(EnqueueOutcome::SkippedNoCredits);
    }

    sqlx::query(
        r#"
        INSERT INTO webhook_intake (id, user_id, connected_account_id, message_id, status, received_at)
        VALUES ($1, $2, $3, $4, 'queued', NOW())
        ON CONFLICT (user_id, message_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payload.user_id)
    .bind(&payload.connected_account_id)
    .bind(&payload.message_id)
    .execute(pool)
    .await?;

    Ok(EnqueueOutcome::Enqueued)
}

#[derive(Debug, sqlx::FromRow)]
struct QueuedItem {
    id: Uuid,
    user_id: String,
    connected_account_id: String,
    message_id: String,
}

/// Atomically claims the oldest queued (or stuck) item and runs the
/// live pipeline against it. Claim uses the same stuck-timeout recovery
/// window the teacher uses for Stripe events (§4.11: 30 minutes).
#[allow(clippy::too_many_arguments)]
pub async fn claim_and_process(
    pool: &PgPool,
    aggregator: &dyn MailAggregator,
    extractor: &dyn Extractor,
    commitments: &dyn CommitmentStore,
    credits: &dyn CreditStore,
    profiles: &dyn UserProfileProvider,
    connections: &dyn ConnectionStore,
    triggers: Option<&dyn TriggerProvider>,
    config: &Config,
) -> CoreResult<bool> {
    let Some(item) = claim_next(pool, config.webhook_claim_timeout_minutes).await? else {
        return Ok(false);
    };

    let (founder_name, founder_email) = profiles.founder_info(&item.user_id).await?;
    let user_context = UserContext::new(item.user_id.clone(), founder_name, founder_email);

    let result = process_claimed(
        pool,
        aggregator,
        extractor,
        commitments,
        credits,
        connections,
        triggers,
        &user_context,
        config,
        &item,
    )
    .await;

    match &result {
        Ok(()) => mark_done(pool, &item.id, "done", None).await?,
        Err(e) => mark_done(pool, &item.id, "error", Some(&e.to_string())).await?,
    }

    result.map(|_| true)
}

async fn claim_next(pool: &PgPool, claim_timeout_minutes: i64) -> CoreResult<Option<QueuedItem>> {
    let claimed: Option<QueuedItem> = sqlx::query_as(
        r#"
        UPDATE webhook_intake
        SET status = 'processing', claimed_at = NOW()
        WHERE id = (
            SELECT id FROM webhook_intake
            WHERE status = 'queued'
               OR (status = 'processing' AND claimed_at < NOW() - make_interval(mins => $1))
            ORDER BY received_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, user_id, connected_account_id, message_id
        "#,
    )
    .bind(claim_timeout_minutes as i32)
    .fetch_optional(pool)
    .await?;

    Ok(claimed)
}

async fn mark_done(pool: &PgPool, id: &Uuid, status: &str, error_message: Option<&str>) -> CoreResult<()> {
    sqlx::query(
        "UPDATE webhook_intake SET status = $2, processed_at = NOW(), error_message = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(status)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn process_claimed(
    _pool: &PgPool,
    aggregator: &dyn MailAggregator,
    extractor: &dyn Extractor,
    commitments: &dyn CommitmentStore,
    credits: &dyn CreditStore,
    connections: &dyn ConnectionStore,
    triggers: Option<&dyn TriggerProvider>,
    user_context: &UserContext,
    config: &Config,
    item: &QueuedItem,
) -> CoreResult<()> {
    // Dedupe by (user, message_id): spec.md §4.9 step 4d.
    if commitments
        .get_by_message_id(&item.user_id, &item.message_id)
        .await?
        .is_some()
    {
        info!(user_id = %item.user_id, message_id = %item.message_id, "duplicate message_id, skipping");
        return Ok(());
    }

    let message = aggregator
        .fetch_message(&item.connected_account_id, &item.message_id)
        .await?;

    let folder = if message.is_sent() { Folder::Sent } else { Folder::Inbox };
    let body: String = extract_email_text(&message.payload).chars().take(4000).collect();
    let date = message.internal_date.unwrap_or_else(OffsetDateTime::now_utc);

    let email = match folder {
        Folder::Inbox => {
            let sender_raw = message.header("From").unwrap_or_default().to_string();
            EmailInput {
                sender: crate::mailparse::extract_email_address(&sender_raw),
                sender_name: sender_raw,
                subject: message.header("Subject").unwrap_or_default().to_string(),
                body,
                date,
                message_id: message.message_id.clone(),
                folder,
                recipient_email: user_context.founder_email.clone(),
                recipient_name: user_context.founder_name.clone(),
            }
        }
        Folder::Sent => {
            let to_header = message.header("To").unwrap_or_default();
            let first_recipient = to_header.split(',').next().unwrap_or_default().trim();
            EmailInput {
                sender: user_context.founder_email.clone(),
                sender_name: "You".to_string(),
                subject: message.header("Subject").unwrap_or_default().to_string(),
                body,
                date,
                message_id: message.message_id.clone(),
                folder,
                recipient_email: crate::mailparse::extract_email_address(first_recipient),
                recipient_name: first_recipient.to_string(),
            }
        }
    };

    let extraction = extract_with_retry(extractor, &email, user_context, config.extraction_retries).await;

    let outcome = credits
        .deduct(
            &item.user_id,
            credits_spent(
                extraction.input_tokens,
                extraction.output_tokens,
                config.input_tokens_per_credit,
                config.output_tokens_per_credit,
            ),
        )
        .await?;
    match triggers {
        Some(triggers) => {
            fire_pause_hook_if_exhausted(outcome, &item.user_id, |uid| trigger::pause_triggers(connections, triggers, uid)).await;
        }
        None => {
            if outcome.just_exhausted {
                warn!(user_id = %item.user_id, "credits exhausted but no trigger provider configured to pause");
            }
        }
    }

    if !extraction.has_commitment {
        return Ok(());
    }

    let today = OffsetDateTime::now_utc().date();
    for raw in extraction.commitments {
        let mut commitment = crate::extraction::post_process(
            raw,
            &email,
            extraction.direction,
            extraction.classification.sender_role,
            &message.message_id,
            today,
        );
        commitment.user_id = item.user_id.clone();
        status::recompute(&mut commitment, today);
        commitments.upsert(&commitment).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_outcome_variants_are_distinct() {
        assert_ne!(EnqueueOutcome::Enqueued, EnqueueOutcome::SkippedNoCredits);
    }
}
