//! Deterministic deadline normalizer (C1).
//!
//! Maps a free-text deadline phrase plus the email's timestamp to an ISO
//! date, or `None` if nothing matches. Pure function, no I/O — ported
//! rule-for-rule from the original `deadline_parser.py`, which spec.md
//! §4.1 describes in prose.

use regex::Regex;
use std::sync::OnceLock;
use time::{Date, Month, OffsetDateTime, Weekday};

fn weekday_index(wd: Weekday) -> i64 {
    match wd {
        Weekday::Monday => 0,
        Weekday::Tuesday => 1,
        Weekday::Wednesday => 2,
        Weekday::Thursday => 3,
        Weekday::Friday => 4,
        Weekday::Saturday => 5,
        Weekday::Sunday => 6,
    }
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Monday),
        "tuesday" => Some(Weekday::Tuesday),
        "wednesday" => Some(Weekday::Wednesday),
        "thursday" => Some(Weekday::Thursday),
        "friday" => Some(Weekday::Friday),
        "saturday" => Some(Weekday::Saturday),
        "sunday" => Some(Weekday::Sunday),
        _ => None,
    }
}

/// Next occurrence of `target` on/after `reference`; `next` forces a
/// strictly-future date even when `reference` already falls on `target`.
fn weekday_after(reference: Date, target: Weekday, next: bool) -> Date {
    let days_ahead = (weekday_index(target) - weekday_index(reference.weekday())).rem_euclid(7);
    let days_ahead = if next && days_ahead == 0 {
        7
    } else {
        days_ahead
    };
    reference + time::Duration::days(days_ahead)
}

fn month_from_abbrev(abbrev: &str) -> Option<Month> {
    Some(match &abbrev[..3.min(abbrev.len())] {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    })
}

macro_rules! cached_re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            #[allow(clippy::unwrap_used)]
            RE.get_or_init(|| Regex::new($pat).unwrap())
        }
    };
}

cached_re!(re_within_hours, r"within\s+\d+\s*(hour|hr|minute|min)");
cached_re!(re_in_hours, r"in\s+\d+\s*(hour|hr|minute|min)");
cached_re!(
    re_before_event,
    r"before\s+(the|our|my)\s+(meeting|call|demo|presentation|review)"
);
cached_re!(
    re_weekday,
    r"(?:(?:by|due|on|before)\s+)?(?:(next|this)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)"
);
cached_re!(re_in_days, r"(?:in|within)\s+(\d+)\s*days?");
cached_re!(
    re_ordinal_month,
    r"(\d{1,2})(?:st|nd|rd|th)?\s*(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\w*"
);
cached_re!(
    re_month_ordinal,
    r"(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\w*\s+(\d{1,2})(?:st|nd|rd|th)?"
);
cached_re!(re_bare_ordinal, r"(?:the|by)\s+(\d{1,2})(?:st|nd|rd|th)");
cached_re!(re_iso_date, r"(\d{4})-(\d{2})-(\d{2})");

const NULL_LIKE: &[&str] = &[
    "null",
    "none",
    "n/a",
    "na",
    "no deadline",
    "no date",
    "tbd",
    "to be determined",
];

const URGENT_PHRASES: &[&str] = &[
    "asap",
    "as soon as possible",
    "immediately",
    "right away",
    "right now",
    "urgent",
    "urgently",
    "at your earliest",
];

/// Normalize a deadline phrase against the email's timestamp. Rules are
/// applied in order; the first match wins (spec.md §4.1).
pub fn normalize(raw: Option<&str>, email_ts: OffsetDateTime) -> Option<Date> {
    let raw = raw?;
    let txt = raw.trim().to_lowercase();
    if txt.is_empty() {
        return None;
    }

    if NULL_LIKE.contains(&txt.as_str()) {
        return None;
    }

    let today = email_ts.date();

    // Same-day markers.
    if txt.contains("tonight") || txt.contains("this evening") {
        return Some(today);
    }
    if txt.contains("today") && !txt.contains("yesterday") {
        return Some(today);
    }
    if txt.contains("end of day") || txt.contains("eod") {
        return Some(today);
    }
    if txt.contains("close of business") || txt.contains("cob") {
        return Some(today);
    }
    if URGENT_PHRASES.iter().any(|p| txt.contains(p)) {
        return Some(today);
    }
    if re_within_hours().is_match(&txt) || re_in_hours().is_match(&txt) {
        return Some(today);
    }
    if re_before_event().is_match(&txt) {
        return Some(today);
    }

    // Next-day markers.
    if txt.contains("tomorrow") {
        return Some(today + time::Duration::days(1));
    }
    if txt.contains("first thing") && txt.contains("morning") {
        return Some(today + time::Duration::days(1));
    }

    // Weekday reference.
    if let Some(caps) = re_weekday().captures(&txt) {
        let qualifier = caps.get(1).map(|m| m.as_str()).unwrap_or("this");
        if let Some(wd) = caps.get(2).and_then(|m| weekday_from_name(m.as_str())) {
            return Some(weekday_after(today, wd, qualifier == "next"));
        }
    }

    // Relative week markers.
    if txt.contains("next week") {
        return Some(today + time::Duration::days(7));
    }
    if txt.contains("this week") {
        return Some(weekday_after(today, Weekday::Sunday, false));
    }
    if txt.contains("end of week") || txt.contains("end of the week") {
        return Some(weekday_after(today, Weekday::Friday, false));
    }

    // "in/within N days".
    if let Some(caps) = re_in_days().captures(&txt) {
        if let Ok(days) = caps[1].parse::<i64>() {
            return Some(today + time::Duration::days(days));
        }
    }

    // Explicit ISO date.
    if let Some(caps) = re_iso_date().captures(&txt) {
        if let (Ok(y), Ok(m), Ok(d)) = (
            caps[1].parse::<i32>(),
            caps[2].parse::<u8>(),
            caps[3].parse::<u8>(),
        ) {
            if let Ok(month) = Month::try_from(m) {
                if let Ok(date) = Date::from_calendar_date(y, month, d) {
                    return Some(date);
                }
            }
        }
    }

    // Ordinal + month name ("22nd Nov", "25 November").
    if let Some(caps) = re_ordinal_month().captures(&txt) {
        if let (Ok(day), Some(month)) = (
            caps[1].parse::<u8>(),
            month_from_abbrev(&caps[2]),
        ) {
            if let Ok(date) = Date::from_calendar_date(today.year(), month, day) {
                return Some(date);
            }
        }
    }

    // Month name + ordinal ("Nov 25", "November 25th").
    if let Some(caps) = re_month_ordinal().captures(&txt) {
        if let (Some(month), Ok(day)) = (
            month_from_abbrev(&caps[1]),
            caps[2].parse::<u8>(),
        ) {
            if let Ok(date) = Date::from_calendar_date(today.year(), month, day) {
                return Some(date);
            }
        }
    }

    // Bare ordinal ("the 25th") — current month, rolling forward if past.
    if let Some(caps) = re_bare_ordinal().captures(&txt) {
        if let Ok(day) = caps[1].parse::<u8>() {
            if let Ok(mut date) = Date::from_calendar_date(today.year(), today.month(), day) {
                if date < today {
                    let (next_year, next_month) = if today.month() == Month::December {
                        (today.year() + 1, Month::January)
                    } else {
                        (today.year(), today.month().next())
                    };
                    if let Ok(rolled) = Date::from_calendar_date(next_year, next_month, day) {
                        date = rolled;
                    }
                }
                return Some(date);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // Monday 2025-11-24T09:00:00Z, matching the original parser's test harness.
    const REF: OffsetDateTime = datetime!(2025-11-24 09:00:00 UTC);

    #[test]
    fn null_like_phrases_return_none() {
        for phrase in ["null", "none", "n/a", "tbd", "no deadline"] {
            assert_eq!(normalize(Some(phrase), REF), None, "phrase={phrase}");
        }
    }

    #[test]
    fn same_day_markers() {
        for phrase in [
            "tonight",
            "this evening",
            "today",
            "end of day",
            "EOD",
            "close of business",
            "COB",
            "ASAP",
            "urgent",
            "within 2 hours",
            "in 30 minutes",
            "before the meeting",
        ] {
            assert_eq!(normalize(Some(phrase), REF), Some(REF.date()), "phrase={phrase}");
        }
    }

    #[test]
    fn today_excludes_yesterday() {
        assert_eq!(normalize(Some("yesterday"), REF), None);
    }

    #[test]
    fn next_day_markers() {
        let tomorrow = REF.date() + time::Duration::days(1);
        assert_eq!(normalize(Some("tomorrow"), REF), Some(tomorrow));
        assert_eq!(normalize(Some("first thing tomorrow morning"), REF), Some(tomorrow));
    }

    #[test]
    fn by_friday_is_this_friday() {
        // REF is Monday; "this" Friday is 4 days later.
        let friday = REF.date() + time::Duration::days(4);
        assert_eq!(normalize(Some("by Friday"), REF), Some(friday));
        assert_eq!(normalize(Some("this Friday"), REF), Some(friday));
    }

    #[test]
    fn next_monday_skips_today() {
        // REF is itself Monday; "next monday" must be strictly after today.
        let next_monday = REF.date() + time::Duration::days(7);
        assert_eq!(normalize(Some("next Monday"), REF), Some(next_monday));
    }

    #[test]
    fn relative_week_markers() {
        assert_eq!(
            normalize(Some("next week"), REF),
            Some(REF.date() + time::Duration::days(7))
        );
        // "this week" -> upcoming Sunday (6 days out from Monday).
        assert_eq!(
            normalize(Some("this week"), REF),
            Some(REF.date() + time::Duration::days(6))
        );
        // "end of week" -> upcoming Friday (4 days out from Monday).
        assert_eq!(
            normalize(Some("end of week"), REF),
            Some(REF.date() + time::Duration::days(4))
        );
    }

    #[test]
    fn in_n_days() {
        assert_eq!(
            normalize(Some("in 3 days"), REF),
            Some(REF.date() + time::Duration::days(3))
        );
        assert_eq!(
            normalize(Some("within 5 days"), REF),
            Some(REF.date() + time::Duration::days(5))
        );
    }

    #[test]
    fn explicit_ordinal_date() {
        let expected = Date::from_calendar_date(2025, Month::November, 25).unwrap();
        assert_eq!(normalize(Some("Nov 25"), REF), Some(expected));
        assert_eq!(normalize(Some("25th November"), REF), Some(expected));
    }

    #[test]
    fn bare_ordinal_rolls_forward_when_past() {
        // "the 1st" relative to Nov 24 has already passed -> rolls to December.
        let expected = Date::from_calendar_date(2025, Month::December, 1).unwrap();
        assert_eq!(normalize(Some("the 1st"), REF), Some(expected));
    }

    #[test]
    fn unparseable_returns_none() {
        assert_eq!(normalize(Some("whenever you get a chance"), REF), None);
    }

    #[test]
    fn none_input_returns_none() {
        assert_eq!(normalize(None, REF), None);
    }
}
