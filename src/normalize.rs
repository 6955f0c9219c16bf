//! Record normalizer: raw feed events to canonical activities.
//!
//! Never fails. Anything that cannot be parsed is replaced with a sentinel
//! and a warning is logged, so every output row satisfies the store's
//! NOT NULL and length constraints.

use std::sync::OnceLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::types::{Activity, RawActivity};

pub const NAME_LIMIT: usize = 255;
pub const ACTIVITY_TYPE_LIMIT: usize = 255;
pub const TIME_SINCE_LIMIT: usize = 255;
pub const TICKET_URL_LIMIT: usize = 65_535;

const UNKNOWN: &str = "Unknown";

/// Date written when the feed's date cannot be parsed: 1900-01-01.
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Timestamp written when the feed's stamp cannot be parsed: 1900-01-01 00:00:00.
pub fn sentinel_timestamp() -> NaiveDateTime {
    sentinel_date().and_time(NaiveTime::MIN)
}

fn ordinal_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap())
}

/// Parse the date half of a feed stamp, e.g. `"March 5th 2024"` or
/// `"March 5th, 2024"`. Already-canonical `YYYY-MM-DD` is accepted as well.
pub fn parse_feed_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    let without_commas = trimmed.replace(',', "");
    let stripped = ordinal_suffix_re().replace_all(&without_commas, "$1");
    NaiveDate::parse_from_str(&stripped, "%B %d %Y").ok()
}

/// Parse the time half of a feed stamp, e.g. `"14:32:10"`.
pub fn parse_feed_time(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M:%S").ok()
}

/// Split `"March 5th 2024, 14:32:10"` into its date and time halves. The time
/// is always last, so a comma inside the date stays with the date.
fn split_stamp(stamp: &str) -> (&str, Option<&str>) {
    match stamp.rsplit_once(", ") {
        Some((date, time)) => (date, Some(time)),
        None => (stamp, None),
    }
}

/// Render an interval as `H:MM:SS` or `N day(s), H:MM:SS`. Negative
/// intervals borrow a whole day, so ten seconds in the future reads
/// `-1 day, 23:59:50`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds();
    let days = total.div_euclid(86_400);
    let rem = total.rem_euclid(86_400);
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);
    match days {
        0 => clock,
        1 | -1 => format!("{} day, {}", days, clock),
        _ => format!("{} days, {}", days, clock),
    }
}

/// Truncate to at most `limit` characters.
pub fn truncate_chars(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}

fn text_or_unknown(value: Option<&str>, limit: usize) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => truncate_chars(v, limit),
        _ => UNKNOWN.to_string(),
    }
}

/// Normalize one raw event. `now` is the extraction clock used for
/// `time_since_last_activity`.
pub fn normalize(raw: &RawActivity, now: NaiveDateTime) -> Activity {
    let name = text_or_unknown(raw.name.as_deref(), NAME_LIMIT);
    let activity_type = text_or_unknown(raw.activity_type.as_deref(), ACTIVITY_TYPE_LIMIT);

    let stamp = raw.when.as_deref().unwrap_or("");
    let (date_part, time_part) = split_stamp(stamp);

    let parsed_date = parse_feed_date(date_part);
    if parsed_date.is_none() {
        log::warn!(
            "Invalid date format: {:?} for {}. Using default '{}'.",
            date_part,
            name,
            sentinel_date()
        );
    }
    let parsed_time = time_part.and_then(parse_feed_time);
    if parsed_time.is_none() {
        log::warn!(
            "Invalid time format: {:?} for {}. Using default '00:00:00'.",
            time_part.unwrap_or(""),
            name
        );
    }

    let (timestamp, time_since) = match (parsed_date, parsed_time) {
        (Some(date), Some(time)) => {
            let ts = date.and_time(time);
            (ts, truncate_chars(&format_elapsed(now - ts), TIME_SINCE_LIMIT))
        }
        _ => {
            log::warn!(
                "Invalid datetime format: {:?}. Using default '{}'.",
                stamp,
                sentinel_timestamp()
            );
            (sentinel_timestamp(), UNKNOWN.to_string())
        }
    };

    let ticket_url = raw
        .ticket_url
        .as_deref()
        .map(|u| truncate_chars(u.trim(), TICKET_URL_LIMIT))
        .unwrap_or_default();

    Activity {
        name,
        activity_type,
        date: parsed_date.unwrap_or_else(sentinel_date),
        time: parsed_time.unwrap_or(NaiveTime::MIN),
        timestamp,
        ticket_url,
        time_since_last_activity: time_since,
    }
}

/// Normalize a whole feed batch against a single extraction clock.
pub fn normalize_batch<I>(raws: I, now: NaiveDateTime) -> Vec<Activity>
where
    I: IntoIterator<Item = RawActivity>,
{
    raws.into_iter().map(|raw| normalize(&raw, now)).collect()
}
