use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Fixed-width so that lexical order of the stored text equals chronological order.
const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn format(ts: DateTime<Utc>) -> String {
    ts.format(FORMAT).to_string()
}

pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Current time truncated to storage precision.
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

/// Earliest storable instant that is not before `now` and strictly after `previous`.
pub fn next_after(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate(now);
    match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    }
}

fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}
