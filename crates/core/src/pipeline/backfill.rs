//! Backfill pipeline (C8): dual-direction initial sync over the window
//! `[first_connected_at - 2 days, first_connected_at]`, inclusive both
//! ends. Ported from `tools/gmail/initial_sync.py`'s `run_initial_sync`
//! / `process_email_batch`.

use crate::aggregator::{MailAggregator, RawMessage};
use crate::commitment::{Commitment, CommitmentStore};
use crate::config::Config;
use crate::connection::ConnectionStore;
use crate::credit::{credits_spent, CreditStore};
use crate::error::CoreResult;
use crate::extraction::{extract_with_retry, EmailInput, Extractor, Folder, UserContext};
use crate::mailparse::{extract_email_address, extract_email_text, is_likely_newsletter};
use crate::trigger::TriggerProvider;
use crate::{status, trigger};
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

pub struct BackfillDeps<'a> {
    pub aggregator: &'a dyn MailAggregator,
    pub extractor: &'a dyn Extractor,
    pub commitments: &'a dyn CommitmentStore,
    pub connections: &'a dyn ConnectionStore,
    pub credits: &'a dyn CreditStore,
    pub triggers: &'a dyn TriggerProvider,
    pub config: &'a Config,
}

pub struct BackfillOutcome {
    pub commitments_found: usize,
    pub triggers: (String, String),
}

/// Runs the full backfill for a user that just connected (or
/// reconnected, per `should_run_initial_sync`). Caller is responsible
/// for checking that gate before invoking this.
pub async fn run_initial_sync(
    deps: &BackfillDeps<'_>,
    user_id: &str,
    entity_id: &str,
    user_context: &UserContext,
    first_connected_at: OffsetDateTime,
) -> CoreResult<BackfillOutcome> {
    let acquired = deps.connections.acquire_sync_lock(user_id).await?;
    if !acquired {
        warn!(user_id, "backfill already in progress, skipping");
        return Ok(BackfillOutcome {
            commitments_found: 0,
            triggers: (String::new(), String::new()),
        });
    }

    let result = run_locked(deps, user_id, entity_id, user_context, first_connected_at).await;

    // Always released, mirroring the Python `finally` block (spec.md
    // §4.8 "the global lock is always released").
    if let Err(e) = deps.connections.release_sync_lock(user_id).await {
        warn!(user_id, error = %e, "failed to release sync lock");
    }

    result
}

async fn run_locked(
    deps: &BackfillDeps<'_>,
    user_id: &str,
    entity_id: &str,
    user_context: &UserContext,
    first_connected_at: OffsetDateTime,
) -> CoreResult<BackfillOutcome> {
    deps.credits
        .initialize_if_missing(user_id, deps.config.default_free_trial_credits)
        .await?;

    let window_start = first_connected_at - Duration::days(2);
    let window_end = first_connected_at;

    let inbox = deps
        .aggregator
        .fetch_inbox(entity_id, deps.config.initial_sync_max_inbox, deps.config.initial_sync_batch)
        .await
        .unwrap_or_else(|e| {
            warn!(user_id, error = %e, "inbox fetch failed, preserving sent results");
            Vec::new()
        });
    let sent = deps
        .aggregator
        .fetch_sent(entity_id, deps.config.initial_sync_max_sent, deps.config.initial_sync_batch)
        .await
        .unwrap_or_else(|e| {
            warn!(user_id, error = %e, "sent fetch failed, preserving inbox results");
            Vec::new()
        });

    let mut total_found = 0usize;

    total_found += process_folder(
        deps,
        user_id,
        user_context,
        &inbox,
        Folder::Inbox,
        window_start,
        window_end,
        true,
    )
    .await;

    total_found += process_folder(
        deps,
        user_id,
        user_context,
        &sent,
        Folder::Sent,
        window_start,
        window_end,
        false,
    )
    .await;

    deps.connections
        .complete_initial_sync(user_id, total_found as i64)
        .await?;

    let triggers = trigger::ensure_triggers(
        deps.connections,
        deps.triggers,
        user_id,
        entity_id,
        Duration::seconds(deps.config.trigger_lock_staleness_seconds),
    )
    .await?;

    Ok(BackfillOutcome {
        commitments_found: total_found,
        triggers,
    })
}

#[allow(clippy::too_many_arguments)]
async fn process_folder(
    deps: &BackfillDeps<'_>,
    user_id: &str,
    user_context: &UserContext,
    messages: &[RawMessage],
    folder: Folder,
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    apply_newsletter_filter: bool,
) -> usize {
    let mut found = 0usize;

    for message in messages {
        let ts = message.internal_date.unwrap_or_else(OffsetDateTime::now_utc);
        if ts < window_start || ts > window_end {
            continue;
        }

        if apply_newsletter_filter {
            let sender_email = message.header("From").map(extract_email_address).unwrap_or_default();
            let subject = message.header("Subject").unwrap_or_default().to_string();
            if is_likely_newsletter(&message.headers, &sender_email, &subject) {
                continue;
            }
        }

        match deps.credits.has_credits(user_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(user_id, "credits exhausted mid-backfill, halting extraction");
                break;
            }
            Err(e) => {
                warn!(user_id, error = %e, "credit check failed, halting folder");
                break;
            }
        }

        let email = match build_email_input(message, folder, user_context) {
            Some(e) => e,
            None => continue,
        };

        let extraction = extract_with_retry(deps.extractor, &email, user_context, deps.config.extraction_retries).await;

        match deps
            .credits
            .deduct(
                user_id,
                credits_spent(
                    extraction.input_tokens,
                    extraction.output_tokens,
                    deps.config.input_tokens_per_credit,
                    deps.config.output_tokens_per_credit,
                ),
            )
            .await
        {
            Ok(outcome) => {
                crate::credit::fire_pause_hook_if_exhausted(outcome, user_id, |uid| {
                    trigger::pause_triggers(deps.connections, deps.triggers, uid)
                })
                .await;
            }
            Err(e) => warn!(user_id, error = %e, "credit deduction failed, continuing"),
        }

        if !extraction.has_commitment {
            continue;
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
            commitment.user_id = user_id.to_string();
            status::recompute(&mut commitment, today);

            if let Err(e) = deps.commitments.upsert(&commitment).await {
                warn!(user_id, message_id = %message.message_id, error = %e, "failed to persist commitment, continuing");
                continue;
            }
            found += 1;
        }
    }

    found
}

fn build_email_input(message: &RawMessage, folder: Folder, user_context: &UserContext) -> Option<EmailInput> {
    let body = extract_email_text(&message.payload);
    let body: String = body.chars().take(4000).collect();
    let date = message.internal_date.unwrap_or_else(OffsetDateTime::now_utc);

    match folder {
        Folder::Inbox => {
            let sender_raw = message.header("From")?.to_string();
            let sender = extract_email_address(&sender_raw);
            Some(EmailInput {
                sender,
                sender_name: display_name(&sender_raw),
                subject: message.header("Subject").unwrap_or_default().to_string(),
                body,
                date,
                message_id: message.message_id.clone(),
                folder,
                recipient_email: user_context.founder_email.clone(),
                recipient_name: user_context.founder_name.clone(),
            })
        }
        Folder::Sent => {
            let to_header = message.header("To").unwrap_or_default();
            let first_recipient = to_header.split(',').next().unwrap_or_default().trim();
            Some(EmailInput {
                sender: user_context.founder_email.clone(),
                sender_name: "You".to_string(),
                subject: message.header("Subject").unwrap_or_default().to_string(),
                body,
                date,
                message_id: message.message_id.clone(),
                folder,
                recipient_email: extract_email_address(first_recipient),
                recipient_name: display_name(first_recipient),
            })
        }
    }
}

fn display_name(header_value: &str) -> String {
    match header_value.find('<') {
        Some(idx) => header_value[..idx].trim().trim_matches('"').to_string(),
        None => header_value.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_angle_bracket_address() {
        assert_eq!(display_name("Sarah Chen <sarah@sequoia.com>"), "Sarah Chen");
        assert_eq!(display_name("bare@example.com"), "bare@example.com");
    }

    #[test]
    fn build_email_input_sent_uses_founder_as_sender() {
        let user_context = UserContext::new("u1", "Founder", "founder@acme.com");
        let message = RawMessage {
            message_id: "m1".into(),
            headers: HashMap::from([("To".to_string(), "Sarah Chen <sarah@sequoia.com>".to_string())]),
            payload: crate::mailparse::MimePart::default(),
            internal_date: Some(OffsetDateTime::now_utc()),
            labels: vec!["SENT".into()],
        };
        let email = build_email_input(&message, Folder::Sent, &user_context).unwrap();
        assert_eq!(email.sender, "founder@acme.com");
        assert_eq!(email.sender_name, "You");
        assert_eq!(email.recipient_email, "sarah@sequoia.com");
        assert_eq!(email.recipient_name, "Sarah Chen");
    }
}
