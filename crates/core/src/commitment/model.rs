//! Commitment record shape (spec.md §3): one row per extracted promise,
//! scoped to a user. Field set matches the `commitments` table in
//! SPEC_FULL.md §3.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStatus {
    Overdue,
    DueToday,
    Active,
    NoDeadline,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Investor,
    Customer,
    Teammate,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Default `estimated_hours` by `commitment_type` (spec.md §4.6 step 2).
pub fn default_estimated_hours(commitment_type: &str) -> f64 {
    match commitment_type {
        "meeting" | "call" => 1.0,
        "email" | "message" => 0.5,
        "report" | "document" => 3.0,
        "presentation" => 5.0,
        "feature" => 8.0,
        _ => 2.0,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Commitment {
    pub id: Uuid,
    pub user_id: String,

    pub what: String,
    pub to_whom: Option<String>,
    pub given_by: Option<String>,

    pub deadline_raw: Option<String>,
    pub deadline_iso: Option<Date>,
    pub status: CommitmentStatus,
    pub days_overdue: i64,
    pub overdue_flag: bool,

    pub priority: Priority,
    pub commitment_type: String,
    pub estimated_hours: f64,
    pub confidence: f64,
    pub sender_role: SenderRole,

    pub direction: Direction,
    pub assigned_to_me: Option<bool>,

    pub message_id: String,
    pub email_subject: Option<String>,
    pub email_sender: Option<String>,
    pub email_sender_name: Option<String>,
    pub email_date: Option<OffsetDateTime>,
    pub source_email_folder: Option<String>,

    pub completed: bool,
    pub completed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
impl Commitment {
    /// Minimal fixture for module-local unit tests; every field not
    /// exercised by the calling test carries an innocuous default.
    pub fn new_for_test() -> Self {
        let now = OffsetDateTime::UNIX_EPOCH;
        Self {
            id: Uuid::nil(),
            user_id: "test-user".into(),
            what: "follow up".into(),
            to_whom: None,
            given_by: None,
            deadline_raw: None,
            deadline_iso: None,
            status: CommitmentStatus::NoDeadline,
            days_overdue: 0,
            overdue_flag: false,
            priority: Priority::Medium,
            commitment_type: "email".into(),
            estimated_hours: 0.5,
            confidence: 0.9,
            sender_role: SenderRole::Unknown,
            direction: Direction::Incoming,
            assigned_to_me: Some(true),
            message_id: "msg-1".into(),
            email_subject: None,
            email_sender: None,
            email_sender_name: None,
            email_date: None,
            source_email_folder: None,
            completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_hours_defaults_match_commitment_type_table() {
        assert_eq!(default_estimated_hours("meeting"), 1.0);
        assert_eq!(default_estimated_hours("call"), 1.0);
        assert_eq!(default_estimated_hours("email"), 0.5);
        assert_eq!(default_estimated_hours("message"), 0.5);
        assert_eq!(default_estimated_hours("report"), 3.0);
        assert_eq!(default_estimated_hours("document"), 3.0);
        assert_eq!(default_estimated_hours("presentation"), 5.0);
        assert_eq!(default_estimated_hours("feature"), 8.0);
        assert_eq!(default_estimated_hours("anything-else"), 2.0);
    }
}
