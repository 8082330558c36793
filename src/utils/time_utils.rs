use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_EVENT_MINUTES: i64 = 60;
const DEFAULT_START_TIME: (u32, u32) = (9, 0);

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(hours?|hrs?|minutes?|mins?)").unwrap());

/// Parses a free-text duration like "1.5 hours" or "45 min" into minutes.
/// Anything unrecognized falls back to the 60-minute default.
pub fn parse_duration_minutes(duration: Option<&str>) -> i64 {
    let Some(duration) = duration else {
        return DEFAULT_EVENT_MINUTES;
    };
    let Some(caps) = DURATION_RE.captures(duration) else {
        return DEFAULT_EVENT_MINUTES;
    };
    let amount: f64 = match caps[1].parse() {
        Ok(v) => v,
        Err(_) => return DEFAULT_EVENT_MINUTES,
    };
    let unit = caps[2].to_lowercase();
    let minutes = if unit.starts_with("hour") || unit.starts_with("hr") {
        amount * 60.0
    } else {
        amount
    };
    minutes.round() as i64
}

/// Resolves `{date, time, duration}` into a concrete `(start, end)` window.
/// A date without a time starts at 09:00. No date means no window.
pub fn resolve_event_window(
    date: Option<&str>,
    time: Option<&str>,
    duration: Option<&str>,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let date = NaiveDate::parse_from_str(date?.trim(), "%Y-%m-%d").ok()?;
    let start_time = time
        .and_then(parse_time)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(DEFAULT_START_TIME.0, DEFAULT_START_TIME.1, 0).unwrap());
    let start = date.and_time(start_time);
    let end = start + Duration::minutes(parse_duration_minutes(duration));
    Some((start, end))
}

fn parse_time(time: &str) -> Option<NaiveTime> {
    let time = time.trim();
    NaiveTime::parse_from_str(time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .ok()
}
