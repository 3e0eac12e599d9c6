//! Status calculator (C2): derives `status`, `days_overdue`, and urgency
//! from `(deadline_iso, today, completed)`. Pure, idempotent, no I/O.

use crate::commitment::model::{Commitment, CommitmentStatus, Priority};
use time::Date;

/// Recompute `status` / `days_overdue` / `overdue_flag` in place.
///
/// Completed commitments are frozen (spec.md I3): this function is a
/// no-op for them, which is what makes it idempotent even across
/// repeated calls after completion.
pub fn recompute(commitment: &mut Commitment, today: Date) {
    if commitment.completed {
        return;
    }

    match commitment.deadline_iso {
        None => {
            commitment.status = CommitmentStatus::NoDeadline;
            commitment.days_overdue = 0;
            commitment.overdue_flag = false;
        }
        Some(deadline) if deadline < today => {
            commitment.status = CommitmentStatus::Overdue;
            commitment.days_overdue = (today - deadline).whole_days().max(0);
            commitment.overdue_flag = true;
        }
        Some(deadline) if deadline == today => {
            commitment.status = CommitmentStatus::DueToday;
            commitment.days_overdue = 0;
            commitment.overdue_flag = false;
        }
        Some(_) => {
            commitment.status = CommitmentStatus::Active;
            commitment.days_overdue = 0;
            commitment.overdue_flag = false;
        }
    }
}

/// Categories used by the query API (§4.10): an `active` commitment is
/// split further into `upcoming` (due within `upcoming_window` days) or
/// `later`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Overdue,
    DueToday,
    Upcoming,
    Later,
    NoDeadline,
    Completed,
}

pub fn categorize(commitment: &Commitment, today: Date, upcoming_window: i64) -> Category {
    if commitment.completed {
        return Category::Completed;
    }
    match commitment.status {
        CommitmentStatus::Overdue => Category::Overdue,
        CommitmentStatus::DueToday => Category::DueToday,
        CommitmentStatus::NoDeadline => Category::NoDeadline,
        CommitmentStatus::Active => match commitment.deadline_iso {
            Some(deadline) if deadline <= today + time::Duration::days(upcoming_window) => {
                Category::Upcoming
            }
            _ => Category::Later,
        },
        CommitmentStatus::Completed => Category::Completed,
    }
}

/// Lower score = more urgent (spec.md §4.2).
pub fn urgency_score(commitment: &Commitment, today: Date) -> i64 {
    match commitment.status {
        CommitmentStatus::Overdue => (100 - commitment.days_overdue).max(0),
        CommitmentStatus::DueToday => 100,
        CommitmentStatus::Active => match commitment.deadline_iso {
            Some(deadline) => {
                let days_until = (deadline - today).whole_days();
                if days_until <= 7 {
                    200 + days_until
                } else {
                    300 + days_until
                }
            }
            None => 1000,
        },
        CommitmentStatus::NoDeadline | CommitmentStatus::Completed => 1000,
    }
}

pub fn priority_score(priority: Priority) -> u8 {
    match priority {
        Priority::High => 0,
        Priority::Medium => 1,
        Priority::Low => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::model::Commitment;
    use proptest::prelude::*;
    use time::macros::date;

    fn base(deadline: Option<Date>) -> Commitment {
        let mut c = Commitment::new_for_test();
        c.deadline_iso = deadline;
        c
    }

    #[test]
    fn no_deadline_is_fixed_point() {
        let today = date!(2025 - 11 - 24);
        let mut c = base(None);
        recompute(&mut c, today);
        assert_eq!(c.status, CommitmentStatus::NoDeadline);
        assert_eq!(c.days_overdue, 0);
        assert!(!c.overdue_flag);
    }

    #[test]
    fn boundary_due_today() {
        let today = date!(2025 - 11 - 24);
        let mut c = base(Some(today));
        recompute(&mut c, today);
        assert_eq!(c.status, CommitmentStatus::DueToday);
        assert_eq!(c.days_overdue, 0);
    }

    #[test]
    fn boundary_one_day_overdue() {
        let today = date!(2025 - 11 - 24);
        let mut c = base(Some(today - time::Duration::days(1)));
        recompute(&mut c, today);
        assert_eq!(c.status, CommitmentStatus::Overdue);
        assert_eq!(c.days_overdue, 1);
        assert!(c.overdue_flag);
    }

    #[test]
    fn recompute_is_idempotent() {
        let today = date!(2025 - 11 - 24);
        let mut c = base(Some(today - time::Duration::days(3)));
        recompute(&mut c, today);
        let snapshot = c.clone();
        recompute(&mut c, today);
        assert_eq!(snapshot.status, c.status);
        assert_eq!(snapshot.days_overdue, c.days_overdue);
        assert_eq!(snapshot.overdue_flag, c.overdue_flag);
    }

    #[test]
    fn completed_commitment_is_frozen() {
        let today = date!(2025 - 11 - 24);
        let mut c = base(Some(today - time::Duration::days(3)));
        c.completed = true;
        c.status = CommitmentStatus::Completed;
        c.days_overdue = 0;
        let before = c.clone();
        recompute(&mut c, today + time::Duration::days(10));
        assert_eq!(before.status, c.status);
        assert_eq!(before.days_overdue, c.days_overdue);
    }

    #[test]
    fn categorize_splits_active_into_upcoming_and_later() {
        let today = date!(2025 - 11 - 24);
        let mut soon = base(Some(today + time::Duration::days(3)));
        recompute(&mut soon, today);
        assert_eq!(categorize(&soon, today, 7), Category::Upcoming);

        let mut later = base(Some(today + time::Duration::days(14)));
        recompute(&mut later, today);
        assert_eq!(categorize(&later, today, 7), Category::Later);
    }

    #[test]
    fn urgency_orders_overdue_before_due_today_before_active() {
        let today = date!(2025 - 11 - 24);
        let mut overdue = base(Some(today - time::Duration::days(2)));
        recompute(&mut overdue, today);
        let mut due_today = base(Some(today));
        recompute(&mut due_today, today);
        let mut active = base(Some(today + time::Duration::days(3)));
        recompute(&mut active, today);

        assert!(urgency_score(&overdue, today) < urgency_score(&due_today, today));
        assert!(urgency_score(&due_today, today) < urgency_score(&active, today));
    }

    proptest::proptest! {
        // spec.md §8: "recompute(recompute(c,d), d) == recompute(c,d)" for
        // any deadline offset, not just the hand-picked boundary cases above.
        #[test]
        fn recompute_is_idempotent_for_any_deadline_offset(offset_days in -60i64..60, completed in any::<bool>()) {
            let today = date!(2025 - 11 - 24);
            let mut c = base(Some(today + time::Duration::days(offset_days)));
            c.completed = completed;
            recompute(&mut c, today);
            let once = c.clone();
            recompute(&mut c, today);
            proptest::prop_assert_eq!(once.status, c.status);
            proptest::prop_assert_eq!(once.days_overdue, c.days_overdue);
            proptest::prop_assert_eq!(once.overdue_flag, c.overdue_flag);
        }
    }
}
