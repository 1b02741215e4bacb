use std::time::SystemTime;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use serde_json::Value;

/// Width of the recency window, exclusive at the old end.
pub const RECENCY_WINDOW_MS: i64 = 1_000;

const HYPHENS: [usize; 4] = [8, 13, 18, 23];

/// True when `value` is a canonical hyphenated UUID (8-4-4-4-12 lowercase hex digits).
pub fn is_string_valid_uuid(value: &str) -> bool {
    value.len() == 36
        && value.bytes().enumerate().all(|(i, b)| {
            if HYPHENS.contains(&i) {
                b == b'-'
            } else {
                matches!(b, b'0'..=b'9' | b'a'..=b'f')
            }
        })
}

/// Like [`is_string_valid_uuid`], but any non-string JSON value is simply not a UUID.
pub fn is_value_valid_uuid(value: &Value) -> bool {
    value.as_str().is_some_and(is_string_valid_uuid)
}

/// Anything that can be read as a point in time.
///
/// Strings are parsed as RFC 3339, or as ISO 8601 without an offset (taken as UTC);
/// JSON numbers are epoch milliseconds. Values that
/// cannot be read yield `None`, which every recency check treats as "not recent".
pub trait AsInstant {
    fn as_instant(&self) -> Option<DateTime<Utc>>;
}

impl AsInstant for DateTime<Utc> {
    fn as_instant(&self) -> Option<DateTime<Utc>> {
        Some(*self)
    }
}

impl AsInstant for DateTime<FixedOffset> {
    fn as_instant(&self) -> Option<DateTime<Utc>> {
        Some(self.with_timezone(&Utc))
    }
}

impl AsInstant for SystemTime {
    fn as_instant(&self) -> Option<DateTime<Utc>> {
        Some(DateTime::<Utc>::from(*self))
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

impl AsInstant for str {
    fn as_instant(&self) -> Option<DateTime<Utc>> {
        let raw = self.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        // no offset: read as UTC
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }
}

impl AsInstant for String {
    fn as_instant(&self) -> Option<DateTime<Utc>> {
        self.as_str().as_instant()
    }
}

impl AsInstant for Value {
    fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::String(s) => s.as_instant(),
            Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }
}

impl<T: AsInstant + ?Sized> AsInstant for &T {
    fn as_instant(&self) -> Option<DateTime<Utc>> {
        (**self).as_instant()
    }
}

/// True when `value` lies in `(now - 1000ms, now]`.
pub fn is_date_less_than_a_second_old<T: AsInstant + ?Sized>(value: &T) -> bool {
    is_recent_at(value, Utc::now())
}

/// [`is_date_less_than_a_second_old`] against an explicit clock.
pub fn is_recent_at<T: AsInstant + ?Sized>(value: &T, now: DateTime<Utc>) -> bool {
    let Some(instant) = value.as_instant() else {
        return false;
    };
    let oldest = now - TimeDelta::milliseconds(RECENCY_WINDOW_MS);
    instant > oldest && instant <= now
}
