//! Parsing for the durations and time bounds accepted on the command line.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{HealthError, Result};

/// Parse `500ms`, `2s`, `1.5s`, `5m`, `2h`, `7d`. A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| HealthError::config(format!("invalid duration '{}'", input)))?;

    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" | "sec" | "secs" => value,
        "m" | "min" | "mins" => value * 60.0,
        "h" | "hr" | "hour" | "hours" => value * 3600.0,
        "d" | "day" | "days" => value * 86_400.0,
        other => {
            return Err(HealthError::config(format!(
                "unknown duration unit '{}' in '{}'",
                other, input
            )))
        }
    };

    Duration::try_from_secs_f64(seconds)
        .map_err(|_| HealthError::config(format!("duration '{}' is out of range", input)))
}

/// Parse a point in time: `now`, RFC 3339, `YYYY-MM-DD[ HH:MM[:SS]]` (UTC),
/// or a duration meaning that long before `now`.
pub fn parse_time_bound(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let s = input.trim();

    if s.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }

    let ago = parse_duration(s)
        .map_err(|_| HealthError::config(format!("unrecognised time '{}'", input)))?;
    let ago = chrono::Duration::from_std(ago)
        .map_err(|_| HealthError::config(format!("time offset '{}' out of range", input)))?;
    now.checked_sub_signed(ago)
        .ok_or_else(|| HealthError::config(format!("time offset '{}' out of range", input)))
}
