#![forbid(unsafe_code)]

//! Duration and start-time grammar shared by the CLI and the feed filter.
//!
//! Three spellings are accepted for a duration:
//!
//! * a colon-delimited clock value, `hh:mm:ss`;
//! * a bare number of seconds, `90` or `12.5`;
//! * a relaxed ISO-8601 duration, `P1Y2M3W4DT5H6M7S`, where every component
//!   is optional, the `P`/`T` designators are optional and letters are case
//!   insensitive (`3d`, `1h`).
//!
//! The letter `M` means months before the time designator and minutes after
//! it. Without a `T`, `5m` therefore reads as five months, not five minutes.
//! Calendar units are approximated as 365-day years, 30-day months and 7-day
//! weeks.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use tracing::warn;

use crate::error::ParseError;

const SECONDS_PER_MINUTE: f64 = 60.0;
const SECONDS_PER_HOUR: f64 = 3_600.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_WEEK: u64 = 7;
const DAYS_PER_MONTH: u64 = 30;
const DAYS_PER_YEAR: u64 = 365;

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^P?",
        r"(?:(?P<years>\d+)Y)?",
        r"(?:(?P<months>\d+)M)?",
        r"(?:(?P<weeks>\d+)W)?",
        r"(?:(?P<days>\d+)D)?",
        r"T?",
        r"(?:(?P<hours>\d+)H)?",
        r"(?:(?P<minutes>\d+)M)?",
        r"(?:(?P<seconds>\d+)S)?$",
    ))
    .expect("duration pattern compiles")
});

/// Parses any of the accepted duration spellings into a number of seconds.
///
/// An empty string matches the ISO grammar with no components and yields
/// zero.
pub fn parse_duration(text: &str) -> Result<f64, ParseError> {
    let text = text.trim();
    if let Some(seconds) = parse_clock(text).or_else(|| parse_seconds(text)) {
        return Ok(seconds);
    }
    parse_iso_duration(text).ok_or_else(|| ParseError::InvalidFormat(text.to_owned()))
}

/// Parses a filter bound, which only accepts `hh:mm:ss` or bare seconds.
pub fn parse_bound(text: &str) -> Result<f64, ParseError> {
    let trimmed = text.trim();
    parse_clock(trimmed)
        .or_else(|| parse_seconds(trimmed))
        .ok_or_else(|| ParseError::InvalidDuration(text.to_owned()))
}

/// `hh:mm:ss`, every component a plain non-negative number.
fn parse_clock(text: &str) -> Option<f64> {
    let mut parts = text.split(':');
    let (hours, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let hours = parse_clock_component(hours)?;
    let minutes = parse_clock_component(minutes)?;
    let seconds = parse_clock_component(seconds)?;
    Some(hours * SECONDS_PER_HOUR + minutes * SECONDS_PER_MINUTE + seconds)
}

fn parse_clock_component(value: &str) -> Option<f64> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    value.parse().ok()
}

fn parse_seconds(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

fn parse_iso_duration(text: &str) -> Option<f64> {
    let captures = ISO_DURATION.captures(text)?;
    let count = |name: &str| -> Option<u64> {
        match captures.name(name) {
            Some(value) => value.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let days = count("weeks")?
        .checked_mul(DAYS_PER_WEEK)?
        .checked_add(count("months")?.checked_mul(DAYS_PER_MONTH)?)?
        .checked_add(count("years")?.checked_mul(DAYS_PER_YEAR)?)?
        .checked_add(count("days")?)?;

    Some(
        days as f64 * SECONDS_PER_DAY
            + count("hours")? as f64 * SECONDS_PER_HOUR
            + count("minutes")? as f64 * SECONDS_PER_MINUTE
            + count("seconds")? as f64,
    )
}

/// Parses an absolute start instant.
///
/// RFC 3339 values keep their offset. A datetime without an offset, or a bare
/// date, is taken to be UTC.
pub fn parse_start_time(text: &str) -> Result<DateTime<Utc>, ParseError> {
    let trimmed = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ParseError::InvalidTimestamp(text.to_owned()))
}

/// Where the run's window starts, as the user expressed it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartTime {
    At(DateTime<Utc>),
    /// Seconds to look back from the moment the cutoff is computed.
    Since(f64),
}

/// The single instant every feed entry is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeCutoff(DateTime<Utc>);

impl TimeCutoff {
    /// Computes the cutoff once; relative starts are measured back from `now`.
    pub fn compute(start: StartTime, now: DateTime<Utc>) -> Self {
        match start {
            StartTime::At(instant) => Self(instant),
            StartTime::Since(seconds) => {
                if seconds == 0.0 {
                    warn!("look-back duration is zero, only uploads from this instant on qualify");
                }
                let millis = (seconds * 1_000.0).round() as i64;
                let instant = TimeDelta::try_milliseconds(millis)
                    .and_then(|delta| now.checked_sub_signed(delta))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                Self(instant)
            }
        }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// Inclusive: an upload published exactly at the cutoff is kept.
    pub fn admits(&self, published: DateTime<Utc>) -> bool {
        published >= self.0
    }
}

impl From<DateTime<Utc>> for TimeCutoff {
    fn from(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}
