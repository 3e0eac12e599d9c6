//! Extraction contract (C5): a pure typed boundary around the LLM call
//! that turns one email into zero or more commitments. The model call
//! itself is out of scope (spec.md §1); this module defines the
//! contract types, the retry policy, and the post-processing steps the
//! pipelines apply to every result.

use crate::commitment::model::{default_estimated_hours, CommitmentStatus, Direction, Priority, SenderRole};
use crate::commitment::Commitment;
use crate::deadline;
use crate::error::{CoreError, CoreResult};
use crate::status;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Folder {
    Inbox,
    Sent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailInput {
    pub sender: String,
    pub sender_name: String,
    pub subject: String,
    /// Truncated to 4000 chars by the caller (spec.md §4.5) before this
    /// type is constructed.
    pub body: String,
    pub date: OffsetDateTime,
    pub message_id: String,
    pub folder: Folder,
    pub recipient_email: String,
    pub recipient_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub founder_name: String,
    pub founder_email: String,
    pub founder_domain: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, founder_name: impl Into<String>, founder_email: impl Into<String>) -> Self {
        let founder_email = founder_email.into();
        let founder_domain = founder_email
            .split('@')
            .nth(1)
            .unwrap_or_default()
            .to_string();
        Self {
            user_id: user_id.into(),
            founder_name: founder_name.into(),
            founder_email,
            founder_domain,
        }
    }
}

/// Resolves the founder name/email needed to build a `UserContext` for
/// a given user id. Backed by whatever out-of-scope user-profile/auth
/// system owns that data (spec.md §1); the live pipeline's queue is
/// keyed only by `user_id`, so this is the seam the worker uses to look
/// up the rest before building `UserContext`.
#[async_trait]
pub trait UserProfileProvider: Send + Sync {
    async fn founder_info(&self, user_id: &str) -> CoreResult<(String, String)>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReasoning {
    pub domain_match: bool,
    pub domain: Option<String>,
    pub signature_match: bool,
    pub subject_hint: bool,
    pub body_hint: bool,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub sender_role: SenderRole,
    pub confidence: f64,
    pub reasoning: ClassificationReasoning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMetadata {
    pub sender: String,
    pub sender_name: String,
    pub subject: String,
    pub date: OffsetDateTime,
    pub message_id: String,
    pub folder: Folder,
}

/// One raw commitment as extracted, before post-processing (step 1-5 of
/// spec.md §4.5 have not run yet: no `given_by`, no `deadline_iso`, no
/// recomputed `status`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCommitment {
    pub what: String,
    pub to_whom: String,
    pub assigned_to_me: bool,
    pub deadline_raw: Option<String>,
    pub priority: Priority,
    pub confidence: f64,
    pub commitment_type: String,
    /// `> 0` when present; `None`/`<= 0` triggers the type-based default.
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub has_commitment: bool,
    pub direction: Direction,
    pub email_metadata: EmailMetadata,
    pub classification: Classification,
    pub commitments: Vec<RawCommitment>,
    pub summary: String,
    /// Token usage for the call that produced this result; the meter
    /// (§4.3) must be charged with these before any further LLM call.
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl ExtractionResult {
    pub fn empty(metadata: EmailMetadata, direction: Direction) -> Self {
        Self {
            has_commitment: false,
            direction,
            classification: Classification {
                sender_role: SenderRole::Unknown,
                confidence: 0.0,
                reasoning: ClassificationReasoning {
                    domain_match: false,
                    domain: None,
                    signature_match: false,
                    subject_hint: false,
                    body_hint: false,
                    fallback_used: true,
                },
            },
            email_metadata: metadata,
            commitments: Vec::new(),
            summary: String::new(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, email: &EmailInput, user: &UserContext) -> CoreResult<ExtractionResult>;
}

/// Retries a transient extractor failure up to `retries` times at a
/// fixed 1-second spacing (spec.md §4.5); on exhaustion returns an empty
/// result rather than propagating the error, so the pipeline keeps
/// whatever it already persisted.
pub async fn extract_with_retry(
    extractor: &dyn Extractor,
    email: &EmailInput,
    user: &UserContext,
    retries: usize,
) -> ExtractionResult {
    let strategy = FixedInterval::from_millis(1000).take(retries);
    let metadata = EmailMetadata {
        sender: email.sender.clone(),
        sender_name: email.sender_name.clone(),
        subject: email.subject.clone(),
        date: email.date,
        message_id: email.message_id.clone(),
        folder: email.folder,
    };
    let direction = match email.folder {
        Folder::Inbox => Direction::Incoming,
        Folder::Sent => Direction::Outgoing,
    };

    let result = Retry::spawn(strategy, || async {
        extractor.extract(email, user).await.map_err(|e| {
            warn!(message_id = %email.message_id, error = %e, "extraction call failed, retrying");
            e.to_string()
        })
    })
    .await;

    result.unwrap_or_else(|_| ExtractionResult::empty(metadata, direction))
}

/// Apply post-processing steps 1-5 of spec.md §4.5 to a raw extracted
/// commitment, producing a fully-formed `Commitment` ready to persist.
pub fn post_process(
    raw: RawCommitment,
    email: &EmailInput,
    direction: Direction,
    sender_role: SenderRole,
    message_id: &str,
    today: time::Date,
) -> Commitment {
    let given_by = email.sender.clone();

    let estimated_hours = match raw.estimated_hours {
        Some(h) if h > 0.0 => h,
        _ => default_estimated_hours(&raw.commitment_type),
    };

    let deadline_iso = deadline::normalize(raw.deadline_raw.as_deref(), email.date);

    let mut commitment = Commitment {
        id: Uuid::new_v4(),
        user_id: String::new(), // filled in by the caller, which knows the user scope
        what: raw.what,
        to_whom: Some(raw.to_whom),
        given_by: Some(given_by),
        deadline_raw: raw.deadline_raw,
        deadline_iso,
        status: CommitmentStatus::NoDeadline,
        days_overdue: 0,
        overdue_flag: false,
        priority: raw.priority,
        commitment_type: raw.commitment_type,
        estimated_hours,
        confidence: raw.confidence,
        sender_role,
        direction,
        assigned_to_me: Some(raw.assigned_to_me),
        message_id: message_id.to_string(),
        email_subject: Some(email.subject.clone()),
        email_sender: Some(email.sender.clone()),
        email_sender_name: Some(email.sender_name.clone()),
        email_date: Some(email.date),
        source_email_folder: Some(match email.folder {
            Folder::Inbox => "INBOX".to_string(),
            Folder::Sent => "SENT".to_string(),
        }),
        completed: false,
        completed_at: None,
        created_at: OffsetDateTime::now_utc(),
        updated_at: OffsetDateTime::now_utc(),
    };

    status::recompute(&mut commitment, today);
    commitment
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn sample_email() -> EmailInput {
        EmailInput {
            sender: "a@b.com".into(),
            sender_name: "A B".into(),
            subject: "deck".into(),
            body: "please send the deck by Friday".into(),
            date: datetime!(2025-11-24 09:00:00 UTC),
            message_id: "m-1".into(),
            folder: Folder::Inbox,
            recipient_email: "founder@acme.com".into(),
            recipient_name: "Founder".into(),
        }
    }

    fn sample_raw() -> RawCommitment {
        RawCommitment {
            what: "send deck".into(),
            to_whom: "A B".into(),
            assigned_to_me: true,
            deadline_raw: Some("by Friday".into()),
            priority: Priority::High,
            confidence: 0.8,
            commitment_type: "email".into(),
            estimated_hours: None,
        }
    }

    #[test]
    fn post_process_resolves_given_by_to_sender() {
        let email = sample_email();
        let c = post_process(sample_raw(), &email, Direction::Incoming, SenderRole::Unknown, "m-1", date!(2025-11-24));
        assert_eq!(c.given_by.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn post_process_defaults_estimated_hours_by_type() {
        let email = sample_email();
        let c = post_process(sample_raw(), &email, Direction::Incoming, SenderRole::Unknown, "m-1", date!(2025-11-24));
        assert_eq!(c.estimated_hours, 0.5); // commitment_type = "email"
    }

    #[test]
    fn post_process_normalizes_deadline_and_recomputes_status() {
        let email = sample_email();
        let c = post_process(sample_raw(), &email, Direction::Incoming, SenderRole::Unknown, "m-1", date!(2025-11-24));
        assert_eq!(c.deadline_iso, Some(date!(2025 - 11 - 28))); // Monday ref -> this Friday
        assert_eq!(c.status, CommitmentStatus::Active);
        assert!(!c.completed);
        assert!(c.completed_at.is_none());
    }

    struct AlwaysFailsExtractor;

    #[async_trait]
    impl Extractor for AlwaysFailsExtractor {
        async fn extract(&self, _email: &EmailInput, _user: &UserContext) -> CoreResult<ExtractionResult> {
            Err(CoreError::AggregatorTransient("boom".into()))
        }
    }

    #[tokio::test]
    async fn retry_exhaustion_returns_empty_result_not_error() {
        let extractor = AlwaysFailsExtractor;
        let email = sample_email();
        let user = UserContext::new("u1", "Founder", "founder@acme.com");
        let result = extract_with_retry(&extractor, &email, &user, 2).await;
        assert!(!result.has_commitment);
        assert!(result.commitments.is_empty());
    }
}
