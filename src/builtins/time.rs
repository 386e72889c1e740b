//! `time(layout)` and `ago` terminals producing `DateTime<Utc>`.

use chrono::format::{self, Parsed, StrftimeItems};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::BoxError;
use crate::registry::Registry;

crate::opaque!(DateTime<Utc>);

static AGO_TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b(?:(\d+)\s*|(an?|one)\s+)
        (years?|yrs?|y|months?|mo|weeks?|wks?|w|days?|d
        |hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)
        \b",
    )
    .expect("ago pattern is valid")
});

pub(crate) fn register(registry: &mut Registry) {
    registry
        .register_terminal("time", |_, text: &str, layout: &str| {
            parse_time(text.trim(), layout.trim())
        })
        .register_terminal("ago", |_, text: &str, _: &str| parse_ago(text, Utc::now()));
}

/// Parse `text` with a strftime `layout`.
///
/// Without an offset in the layout the time is taken as UTC. Missing date
/// fields default to January 1st and a missing time to midnight.
pub fn parse_time(text: &str, layout: &str) -> Result<DateTime<Utc>, BoxError> {
    let mut parsed = Parsed::new();
    format::parse(&mut parsed, text, StrftimeItems::new(layout))?;

    if let Ok(datetime) = parsed.to_datetime() {
        return Ok(datetime.with_timezone(&Utc));
    }

    if parsed.to_naive_date().is_err() {
        // fields that are already set keep their value
        let _ = parsed.set_month(1);
        let _ = parsed.set_day(1);
    }
    let date = parsed.to_naive_date()?;
    let naive = match parsed.to_naive_time() {
        Ok(time) => date.and_time(time),
        Err(_) => date.and_hms_opt(0, 0, 0).ok_or_else(out_of_range)?,
    };

    match parsed.to_fixed_offset() {
        Ok(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|datetime| datetime.with_timezone(&Utc))
            .ok_or_else(|| format!("{text:?} is not a valid local time").into()),
        Err(_) => Ok(Utc.from_utc_datetime(&naive)),
    }
}

/// Resolve a relative phrase such as `3 hours ago` against `now`.
pub fn parse_ago(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, BoxError> {
    let phrase = text.trim().to_lowercase();

    match phrase.as_str() {
        "now" | "just now" | "today" => return Ok(now),
        "yesterday" => return now.checked_sub_signed(TimeDelta::days(1)).ok_or_else(out_of_range),
        _ => {}
    }

    let mut total = TimeDelta::zero();
    let mut matched = false;

    for caps in AGO_TERM.captures_iter(&phrase) {
        let count: i64 = match caps.get(1) {
            Some(digits) => digits.as_str().parse()?,
            None => 1,
        };
        let seconds = count
            .checked_mul(unit_seconds(&caps[3]))
            .ok_or_else(out_of_range)?;
        let delta = TimeDelta::try_seconds(seconds).ok_or_else(out_of_range)?;
        total = total.checked_add(&delta).ok_or_else(out_of_range)?;
        matched = true;
    }

    if !matched {
        return Err(format!("unrecognised relative time {text:?}").into());
    }

    now.checked_sub_signed(total).ok_or_else(out_of_range)
}

fn unit_seconds(unit: &str) -> i64 {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    match unit {
        u if u.starts_with("mo") => 30 * DAY,
        u if u.starts_with('y') => 365 * DAY,
        u if u.starts_with('w') => 7 * DAY,
        u if u.starts_with('d') => DAY,
        u if u.starts_with('h') => HOUR,
        u if u.starts_with('m') => MINUTE,
        _ => 1,
    }
}

fn out_of_range() -> BoxError {
    "relative time out of range".into()
}
