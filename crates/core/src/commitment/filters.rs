//! Flexible filter schema for querying commitments (spec.md §4.10).
//! All fields are optional; a present field narrows the result set.
//! Multiple fields combine with AND. Ported from `filters.py`.

use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, Default)]
pub struct CommitmentFilters {
    pub include_completed: bool,
    pub only_completed: bool,

    pub status: Option<Vec<String>>,

    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub sender_role: Option<Vec<String>>,

    pub direction: Option<Vec<String>>,
    pub assigned_to_me: Option<bool>,

    pub created_after: Option<OffsetDateTime>,
    pub created_before: Option<OffsetDateTime>,

    pub deadline_after: Option<Date>,
    pub deadline_before: Option<Date>,
    pub has_deadline: Option<bool>,

    pub priority: Option<Vec<String>>,
    pub commitment_type: Option<Vec<String>>,

    pub search_text: Option<String>,

    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Deadline,
    CreatedAt,
    Priority,
    DaysOverdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl CommitmentFilters {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    /// Human-readable summary for the query result's `query_description`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();

        if self.only_completed {
            parts.push("completed".to_string());
        } else if !self.include_completed {
            parts.push("active".to_string());
        }

        if let Some(status) = &self.status {
            parts.push(format!("status: {}", status.join(" or ")));
        }
        if let Some(role) = &self.sender_role {
            parts.push(format!("from {}s", role.join(" or ")));
        }
        if let Some(email) = &self.sender_email {
            parts.push(format!("from email containing '{email}'"));
        }
        if let Some(name) = &self.sender_name {
            parts.push(format!("from '{name}'"));
        }
        if let Some(direction) = &self.direction {
            parts.push(format!("direction: {}", direction.join(" or ")));
        }
        match self.assigned_to_me {
            Some(true) => parts.push("assigned to me".to_string()),
            Some(false) => parts.push("assigned to others".to_string()),
            None => {}
        }
        if let Some(priority) = &self.priority {
            parts.push(format!("{} priority", priority.join(" or ")));
        }
        if let Some(ctype) = &self.commitment_type {
            parts.push(format!("type: {}", ctype.join(" or ")));
        }
        if let Some(text) = &self.search_text {
            parts.push(format!("matching '{text}'"));
        }

        match (self.created_after, self.created_before) {
            (Some(a), Some(b)) => parts.push(format!("created between {} and {}", a.date(), b.date())),
            (Some(a), None) => parts.push(format!("created after {}", a.date())),
            (None, Some(b)) => parts.push(format!("created before {}", b.date())),
            (None, None) => {}
        }

        match (self.deadline_after, self.deadline_before) {
            (Some(a), Some(b)) => parts.push(format!("due between {a} and {b}")),
            (Some(a), None) => parts.push(format!("due after {a}")),
            (None, Some(b)) => parts.push(format!("due by {b}")),
            (None, None) => {}
        }

        match self.has_deadline {
            Some(true) => parts.push("with deadline".to_string()),
            Some(false) => parts.push("without deadline".to_string()),
            None => {}
        }

        if parts.is_empty() {
            "All commitments".to_string()
        } else {
            format!("Commitments: {}", parts.join(", "))
        }
    }
}

macro_rules! preset {
    ($name:ident, $body:expr) => {
        pub fn $name() -> CommitmentFilters {
            let base = CommitmentFilters::new();
            $body(base)
        }
    };
}

preset!(all_active, |f| f);
preset!(overdue_only, |f: CommitmentFilters| CommitmentFilters {
    status: Some(vec!["overdue".into()]),
    ..f
});
preset!(due_today_only, |f: CommitmentFilters| CommitmentFilters {
    status: Some(vec!["due_today".into()]),
    ..f
});
preset!(urgent, |f: CommitmentFilters| CommitmentFilters {
    status: Some(vec!["overdue".into(), "due_today".into()]),
    ..f
});
preset!(from_investors, |f: CommitmentFilters| CommitmentFilters {
    sender_role: Some(vec!["investor".into()]),
    ..f
});
preset!(from_customers, |f: CommitmentFilters| CommitmentFilters {
    sender_role: Some(vec!["customer".into()]),
    ..f
});
preset!(high_priority, |f: CommitmentFilters| CommitmentFilters {
    priority: Some(vec!["high".into()]),
    ..f
});
preset!(completed_items, |f: CommitmentFilters| CommitmentFilters {
    only_completed: true,
    ..f
});
preset!(incoming_only, |f: CommitmentFilters| CommitmentFilters {
    direction: Some(vec!["incoming".into()]),
    ..f
});
preset!(outgoing_only, |f: CommitmentFilters| CommitmentFilters {
    direction: Some(vec!["outgoing".into()]),
    ..f
});
preset!(assigned_to_me_preset, |f: CommitmentFilters| CommitmentFilters {
    assigned_to_me: Some(true),
    ..f
});
preset!(waiting_on_others, |f: CommitmentFilters| CommitmentFilters {
    assigned_to_me: Some(false),
    ..f
});
preset!(incoming_assignments, |f: CommitmentFilters| CommitmentFilters {
    direction: Some(vec!["incoming".into()]),
    assigned_to_me: Some(true),
    ..f
});
preset!(incoming_promises, |f: CommitmentFilters| CommitmentFilters {
    direction: Some(vec!["incoming".into()]),
    assigned_to_me: Some(false),
    ..f
});
preset!(outgoing_promises, |f: CommitmentFilters| CommitmentFilters {
    direction: Some(vec!["outgoing".into()]),
    assigned_to_me: Some(true),
    ..f
});
preset!(outgoing_requests, |f: CommitmentFilters| CommitmentFilters {
    direction: Some(vec!["outgoing".into()]),
    assigned_to_me: Some(false),
    ..f
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overdue_preset_describes_status() {
        let f = overdue_only();
        assert!(f.describe().contains("overdue"));
        assert!(f.describe().contains("active"));
    }

    #[test]
    fn urgent_combines_overdue_and_due_today() {
        let f = urgent();
        assert_eq!(f.status, Some(vec!["overdue".to_string(), "due_today".to_string()]));
    }

    #[test]
    fn outgoing_promises_sets_direction_and_assignment() {
        let f = outgoing_promises();
        assert_eq!(f.direction, Some(vec!["outgoing".to_string()]));
        assert_eq!(f.assigned_to_me, Some(true));
    }

    #[test]
    fn no_filters_describes_as_active_only() {
        let f = CommitmentFilters::new();
        assert_eq!(f.describe(), "Commitments: active");
    }
}
