//! Query API (C10): the single read contract the (out-of-scope) chat
//! layer consumes. Implemented in full, not merely a contract surface,
//! because `crates/api` needs a concrete type to expose — dependency
//! direction is chat -> core, never the reverse (spec.md §9).

use crate::commitment::filters::{SortBy, SortOrder};
use crate::commitment::{Commitment, CommitmentFilters, CommitmentStore};
use crate::error::CoreResult;
use crate::status::{self, Category};
use serde::Serialize;
use time::{Date, Duration};

#[derive(Debug, Clone, Serialize, Default)]
pub struct BucketSummary {
    pub overdue: usize,
    pub due_today: usize,
    pub upcoming: usize,
    pub later: usize,
    pub no_deadline: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmptyResultHint {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query_description: String,
    pub filters_applied: String,
    pub total_found: usize,
    pub overdue: Vec<Commitment>,
    pub due_today: Vec<Commitment>,
    pub upcoming: Vec<Commitment>,
    pub later: Vec<Commitment>,
    pub no_deadline: Vec<Commitment>,
    pub completed: Vec<Commitment>,
    pub sorted: Vec<Commitment>,
    pub summary: BucketSummary,
    pub empty_hint: Option<EmptyResultHint>,
}

/// `fetch_commitments(user, filters) -> Result` (spec.md §4.10).
///
/// The persistent filter (`completed`) is pushed down to the store;
/// status must be recomputed on every read before categorization
/// because the stored value is cached at extraction time.
pub async fn fetch_commitments(
    store: &dyn CommitmentStore,
    user_id: &str,
    filters: &CommitmentFilters,
    today: Date,
    upcoming_window_days: i64,
) -> CoreResult<QueryResult> {
    let mut rows = store.query(user_id, filters).await?;

    for commitment in &mut rows {
        status::recompute(commitment, today);
    }
    apply_in_process_filters(&mut rows, filters);
    apply_in_process_sort(&mut rows, filters, today);
    rows.truncate(filters.limit.max(0) as usize);

    let mut buckets = BucketSummary::default();
    let mut overdue = Vec::new();
    let mut due_today = Vec::new();
    let mut upcoming = Vec::new();
    let mut later = Vec::new();
    let mut no_deadline = Vec::new();
    let mut completed = Vec::new();

    for commitment in &rows {
        match status::categorize(commitment, today, upcoming_window_days) {
            Category::Overdue => {
                buckets.overdue += 1;
                overdue.push(commitment.clone());
            }
            Category::DueToday => {
                buckets.due_today += 1;
                due_today.push(commitment.clone());
            }
            Category::Upcoming => {
                buckets.upcoming += 1;
                upcoming.push(commitment.clone());
            }
            Category::Later => {
                buckets.later += 1;
                later.push(commitment.clone());
            }
            Category::NoDeadline => {
                buckets.no_deadline += 1;
                no_deadline.push(commitment.clone());
            }
            Category::Completed => {
                buckets.completed += 1;
                completed.push(commitment.clone());
            }
        }
    }

    let total_found = rows.len();
    let empty_hint = if total_found == 0 {
        Some(empty_result_hint(filters))
    } else {
        None
    };

    Ok(QueryResult {
        query_description: filters.describe(),
        filters_applied: filters.describe(),
        total_found,
        overdue,
        due_today,
        upcoming,
        later,
        no_deadline,
        completed,
        sorted: rows,
        summary: buckets,
        empty_hint,
    })
}

fn apply_in_process_filters(rows: &mut Vec<Commitment>, filters: &CommitmentFilters) {
    if let Some(status_filter) = &filters.status {
        rows.retain(|c| status_filter.iter().any(|s| status_label(c) == s));
    }
    if let Some(sender_email) = &filters.sender_email {
        let needle = sender_email.to_lowercase();
        rows.retain(|c| {
            c.email_sender
                .as_deref()
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false)
        });
    }
    if let Some(sender_name) = &filters.sender_name {
        let needle = sender_name.to_lowercase();
        rows.retain(|c| {
            c.email_sender_name
                .as_deref()
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false)
        });
    }
    if let Some(priority) = &filters.priority {
        rows.retain(|c| priority.iter().any(|p| priority_label(c) == p));
    }
    if let Some(ctype) = &filters.commitment_type {
        rows.retain(|c| ctype.contains(&c.commitment_type));
    }
    if let Some(text) = &filters.search_text {
        let needle = text.to_lowercase();
        rows.retain(|c| {
            c.what.to_lowercase().contains(&needle)
                || c.email_subject
                    .as_deref()
                    .map(|s| s.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        });
    }
    if let Some(after) = filters.created_after {
        rows.retain(|c| c.created_at > after);
    }
    if let Some(before) = filters.created_before {
        rows.retain(|c| c.created_at < before);
    }
    if let Some(after) = filters.deadline_after {
        rows.retain(|c| c.deadline_iso.map(|d| d > after).unwrap_or(false));
    }
    if let Some(before) = filters.deadline_before {
        rows.retain(|c| c.deadline_iso.map(|d| d <= before).unwrap_or(false));
    }
}

/// Sorts on freshly recomputed values, never on the stored `priority`
/// (plain text, alphabetical) or `days_overdue` (cached at extraction
/// time) columns (spec.md §4.2).
fn apply_in_process_sort(rows: &mut [Commitment], filters: &CommitmentFilters, today: Date) {
    match filters.sort_by {
        SortBy::CreatedAt => rows.sort_by_key(|c| c.created_at),
        SortBy::Priority => rows.sort_by_key(|c| status::priority_score(c.priority)),
        SortBy::Deadline | SortBy::DaysOverdue => rows.sort_by_key(|c| status::urgency_score(c, today)),
    }

    // days_overdue defaults to descending (most overdue first) unless
    // explicitly overridden (spec.md §4.2 "Sort orders").
    let ascending = if matches!(filters.sort_by, SortBy::DaysOverdue) && filters.sort_order == SortOrder::default() {
        false
    } else {
        filters.sort_order == SortOrder::Asc
    };
    if !ascending {
        rows.reverse();
    }
}

fn status_label(c: &Commitment) -> &'static str {
    match c.status {
        crate::commitment::CommitmentStatus::Overdue => "overdue",
        crate::commitment::CommitmentStatus::DueToday => "due_today",
        crate::commitment::CommitmentStatus::Active => "active",
        crate::commitment::CommitmentStatus::NoDeadline => "no_deadline",
        crate::commitment::CommitmentStatus::Completed => "completed",
    }
}

fn priority_label(c: &Commitment) -> &'static str {
    match c.priority {
        crate::commitment::Priority::High => "high",
        crate::commitment::Priority::Medium => "medium",
        crate::commitment::Priority::Low => "low",
    }
}

fn empty_result_hint(filters: &CommitmentFilters) -> EmptyResultHint {
    let (kind, message) = if filters.status.is_some() {
        ("status", "No commitments match that status right now.")
    } else if filters.sender_email.is_some() || filters.sender_name.is_some() || filters.sender_role.is_some() {
        ("sender", "No commitments found from that sender.")
    } else if filters.deadline_after.is_some() || filters.deadline_before.is_some() {
        ("date", "No commitments due in that date range.")
    } else if filters.search_text.is_some() {
        ("search", "No commitments match that search text.")
    } else if filters.only_completed {
        ("completed", "No completed commitments yet.")
    } else if filters.priority.is_some() {
        ("priority", "No commitments at that priority level.")
    } else {
        ("general", "No commitments found.")
    };
    EmptyResultHint { kind: kind.to_string(), message: message.to_string() }
}

#[derive(Debug, Clone, Serialize)]
pub struct TodaySnapshot {
    pub overdue: Vec<Commitment>,
    pub due_today: Vec<Commitment>,
    pub received_today: Vec<Commitment>,
    pub due_tomorrow: Vec<Commitment>,
    pub total_hours: f64,
}

/// `today_snapshot(user) -> {overdue, due_today, received_today,
/// due_tomorrow}` (spec.md §4.10), aggregating four queries.
pub async fn today_snapshot(store: &dyn CommitmentStore, user_id: &str, today: Date) -> CoreResult<TodaySnapshot> {
    let overdue = fetch_commitments(store, user_id, &crate::commitment::filters::overdue_only(), today, 7).await?;
    let due_today = fetch_commitments(store, user_id, &crate::commitment::filters::due_today_only(), today, 7).await?;

    let mut received_today_filter = CommitmentFilters::new();
    received_today_filter.created_after = Some(today.midnight().assume_utc());
    let received_today = fetch_commitments(store, user_id, &received_today_filter, today, 7).await?;

    let tomorrow = today + Duration::days(1);
    let mut due_tomorrow_filter = CommitmentFilters::new();
    due_tomorrow_filter.deadline_after = Some(today);
    due_tomorrow_filter.deadline_before = Some(tomorrow);
    let due_tomorrow = fetch_commitments(store, user_id, &due_tomorrow_filter, today, 7).await?;

    let total_hours: f64 = due_tomorrow.sorted.iter().map(|c| c.estimated_hours).sum();

    Ok(TodaySnapshot {
        overdue: overdue.sorted,
        due_today: due_today.sorted,
        received_today: received_today.sorted,
        due_tomorrow: due_tomorrow.sorted,
        total_hours,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::model::Commitment;
    use async_trait::async_trait;
    use time::macros::date;

    struct StubStore {
        rows: Vec<Commitment>,
    }

    #[async_trait]
    impl CommitmentStore for StubStore {
        async fn upsert(&self, c: &Commitment) -> CoreResult<Commitment> {
            Ok(c.clone())
        }
        async fn get(&self, _u: &str, _id: uuid::Uuid) -> CoreResult<Option<Commitment>> {
            Ok(None)
        }
        async fn get_by_message_id(&self, _u: &str, _m: &str) -> CoreResult<Option<Commitment>> {
            Ok(None)
        }
        async fn mark_completed(&self, _u: &str, id: uuid::Uuid, _c: bool) -> CoreResult<Commitment> {
            Err(crate::error::CoreError::NotFound(id.to_string()))
        }
        async fn delete(&self, _u: &str, _id: uuid::Uuid) -> CoreResult<()> {
            Ok(())
        }
        async fn restore(&self, _u: &str, id: uuid::Uuid) -> CoreResult<Commitment> {
            Err(crate::error::CoreError::NotFound(id.to_string()))
        }
        async fn list_deleted(&self, _u: &str, _limit: i64) -> CoreResult<Vec<crate::shadow::ShadowEntry>> {
            Ok(vec![])
        }
        async fn query(&self, _u: &str, _f: &CommitmentFilters) -> CoreResult<Vec<Commitment>> {
            Ok(self.rows.clone())
        }
    }

    #[tokio::test]
    async fn categorizes_into_expected_buckets() {
        let today = date!(2025 - 11 - 24);
        let mut overdue = Commitment::new_for_test();
        overdue.deadline_iso = Some(today - time::Duration::days(1));
        let mut no_deadline = Commitment::new_for_test();
        no_deadline.deadline_iso = None;

        let store = StubStore { rows: vec![overdue, no_deadline] };
        let result = fetch_commitments(&store, "u1", &CommitmentFilters::new(), today, 7).await.unwrap();

        assert_eq!(result.summary.overdue, 1);
        assert_eq!(result.summary.no_deadline, 1);
        assert_eq!(result.total_found, 2);
        assert!(result.empty_hint.is_none());
    }

    #[tokio::test]
    async fn empty_result_carries_contextual_hint() {
        let today = date!(2025 - 11 - 24);
        let store = StubStore { rows: vec![] };
        let result = fetch_commitments(&store, "u1", &crate::commitment::filters::overdue_only(), today, 7)
            .await
            .unwrap();
        assert_eq!(result.empty_hint.unwrap().kind, "status");
    }
}
