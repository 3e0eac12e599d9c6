//! Mail aggregator boundary: the third-party SDK that talks to Gmail is
//! explicitly out of scope (spec.md §1, "treated as an opaque client").
//! This module only defines the trait the pipelines depend on, plus a
//! test double; a production adapter built on `reqwest` (the teacher's
//! HTTP client of choice for Stripe/Supabase) is an external
//! collaborator.

use crate::error::CoreResult;
use crate::mailparse::MimePart;
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message_id: String,
    pub headers: HashMap<String, String>,
    pub payload: MimePart,
    pub internal_date: Option<OffsetDateTime>,
    pub labels: Vec<String>,
}

impl RawMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn is_sent(&self) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case("SENT"))
    }
}

#[async_trait]
pub trait MailAggregator: Send + Sync {
    /// Paged fetch bounded by `limit`, `batch_size` per page — backfill
    /// uses this for both INBOX and SENT (spec.md §4.8 step 3).
    async fn fetch_inbox(&self, entity_id: &str, limit: usize, batch_size: usize) -> CoreResult<Vec<RawMessage>>;
    async fn fetch_sent(&self, entity_id: &str, limit: usize, batch_size: usize) -> CoreResult<Vec<RawMessage>>;

    /// Single-message fetch for the live webhook pipeline (spec.md §4.9
    /// step 4a).
    async fn fetch_message(&self, entity_id: &str, message_id: &str) -> CoreResult<RawMessage>;
}

/// Deterministic in-memory double for pipeline tests.
#[derive(Default)]
pub struct StubAggregator {
    pub inbox: Vec<RawMessage>,
    pub sent: Vec<RawMessage>,
}

#[async_trait]
impl MailAggregator for StubAggregator {
    async fn fetch_inbox(&self, _entity_id: &str, limit: usize, _batch_size: usize) -> CoreResult<Vec<RawMessage>> {
        Ok(self.inbox.iter().take(limit).cloned().collect())
    }

    async fn fetch_sent(&self, _entity_id: &str, limit: usize, _batch_size: usize) -> CoreResult<Vec<RawMessage>> {
        Ok(self.sent.iter().take(limit).cloned().collect())
    }

    async fn fetch_message(&self, _entity_id: &str, message_id: &str) -> CoreResult<RawMessage> {
        self.inbox
            .iter()
            .chain(self.sent.iter())
            .find(|m| m.message_id == message_id)
            .cloned()
            .ok_or_else(|| crate::error::CoreError::NotFound(message_id.to_string()))
    }
}
