//! Natural-language timeframe interpretation.
//!
//! Turns a free-text query into an explicit [`TimeFrame`] using keyword and
//! regex heuristics. Common relative expressions resolve deterministically
//! without a model call; anything unrecognized falls back to a 30-day
//! window. Never fails.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use regex::Regex;

use crate::models::TimeFrame;

/// Default window when the query carries no recognizable timeframe.
const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Upper bound on "last N <unit>" to keep date arithmetic in range.
const MAX_RELATIVE_UNITS: i64 = 10_000;

/// Interpret a query's timeframe relative to `now`.
///
/// Recognized forms: `last/past N hours|days|weeks|months`, `today`,
/// `yesterday`, `this week`, `last week`, `this month`, `last month`.
/// Ambiguity resolves to the most recent plausible interpretation.
pub fn interpret(query: &str, now: DateTime<Utc>) -> TimeFrame {
    let lower = query.to_lowercase();

    if let Some(tf) = relative_units(&lower, now) {
        return tf;
    }

    if lower.contains("yesterday") {
        let today_start = start_of_day(now);
        return TimeFrame::new(today_start - Duration::days(1), today_start, "yesterday");
    }

    if lower.contains("today") {
        return TimeFrame::new(start_of_day(now), now, "today");
    }

    if lower.contains("last week") {
        let week_start = start_of_week(now);
        return TimeFrame::new(week_start - Duration::days(7), week_start, "last week");
    }

    if lower.contains("this week") {
        return TimeFrame::new(start_of_week(now), now, "this week");
    }

    if lower.contains("last month") {
        let month_start = start_of_month(now);
        let prev_start = month_start
            .checked_sub_months(Months::new(1))
            .unwrap_or(month_start);
        return TimeFrame::new(prev_start, month_start, "last month");
    }

    if lower.contains("this month") {
        return TimeFrame::new(start_of_month(now), now, "this month");
    }

    default_window(now)
}

/// Fallback window for queries with no detectable timeframe.
pub fn default_window(now: DateTime<Utc>) -> TimeFrame {
    TimeFrame::new(
        now - Duration::days(DEFAULT_WINDOW_DAYS),
        now,
        format!("last {DEFAULT_WINDOW_DAYS} days (default window)"),
    )
}

static RELATIVE_UNITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:last|past)\s+(\d+)\s+(hour|day|week|month)s?\b").expect("valid regex")
});

/// Match "last/past N hours|days|weeks|months".
fn relative_units(lower: &str, now: DateTime<Utc>) -> Option<TimeFrame> {
    let caps = RELATIVE_UNITS.captures(lower)?;

    let n: i64 = match caps[1].parse() {
        Ok(n) => n,
        // Absurdly long digit runs overflow; treat as unrecognized.
        Err(_) => return Some(default_window(now)),
    };
    let unit = &caps[2];

    // "last 0 days" is invalid input: clamp to a 1-minute window.
    if n == 0 {
        return Some(TimeFrame::new(
            now - Duration::minutes(1),
            now,
            format!("last 0 {unit}s (clamped to 1 minute)"),
        ));
    }

    let n = n.min(MAX_RELATIVE_UNITS);
    let start = match unit {
        "hour" => now - Duration::hours(n),
        "day" => now - Duration::days(n),
        "week" => now - Duration::weeks(n),
        "month" => now
            .checked_sub_months(Months::new(n as u32))
            .unwrap_or(now - Duration::days(n * 30)),
        _ => unreachable!("regex restricts units"),
    };

    let plural = if n == 1 { "" } else { "s" };
    Some(TimeFrame::new(start, now, format!("last {n} {unit}{plural}")))
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
}

fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_into_week = i64::from(now.weekday().num_days_from_monday());
    start_of_day(now) - Duration::days(days_into_week)
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .expect("day 1 always exists")
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
}
