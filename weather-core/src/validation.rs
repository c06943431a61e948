//! Input gateways.
//!
//! Location names, cache keys and client identifiers all go through the same
//! [`validate_text`] routine; only the [`TextRule`] differs. Cache keys and client ids end up
//! inside storage keys of the cache and the rate limiter, so anything outside the whitelist
//! is refused rather than escaped.

use chrono::{Duration, NaiveDate, Utc};

use crate::error::{Result, WeatherError};

/// Characters a text field may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Unicode letters, space, hyphen and apostrophe.
    PlaceName,
    /// ASCII alphanumerics plus `:`, `_`, `-`, `.`.
    Identifier,
}

impl CharClass {
    pub fn allows(self, c: char) -> bool {
        match self {
            CharClass::PlaceName => c.is_alphabetic() || matches!(c, ' ' | '-' | '\''),
            CharClass::Identifier => c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-' | '.'),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            CharClass::PlaceName => "letters, spaces, hyphens and apostrophes",
            CharClass::Identifier => "ASCII letters, digits and ':', '_', '-', '.'",
        }
    }
}

/// Length bounds (in characters, after trimming) plus a character whitelist.
#[derive(Debug, Clone, Copy)]
pub struct TextRule {
    pub min_len: usize,
    pub max_len: usize,
    pub charset: CharClass,
}

pub const LOCATION_NAME: TextRule = TextRule {
    min_len: 1,
    max_len: 100,
    charset: CharClass::PlaceName,
};

pub const CACHE_KEY: TextRule = TextRule {
    min_len: 1,
    max_len: 256,
    charset: CharClass::Identifier,
};

pub const CLIENT_ID: TextRule = TextRule {
    min_len: 1,
    max_len: 128,
    charset: CharClass::Identifier,
};

/// How far back a request date may reach.
pub const MAX_DAYS_PAST: i64 = 365;
/// How far ahead a request date may reach.
pub const MAX_DAYS_AHEAD: i64 = 30;

/// Trim `raw` and check it against `rule`. Returns the trimmed value.
pub fn validate_text<'a>(field: &str, raw: &'a str, rule: &TextRule) -> Result<&'a str> {
    let value = raw.trim();

    if value.is_empty() {
        return Err(WeatherError::validation(field, "must not be empty"));
    }

    let len = value.chars().count();
    if len < rule.min_len || len > rule.max_len {
        return Err(WeatherError::validation(
            field,
            format!(
                "length must be between {} and {} characters, got {len}",
                rule.min_len, rule.max_len
            ),
        ));
    }

    if let Some(bad) = value.chars().find(|c| !rule.charset.allows(*c)) {
        return Err(WeatherError::validation(
            field,
            format!(
                "contains disallowed character {bad:?}; only {} are allowed",
                rule.charset.describe()
            ),
        ));
    }

    Ok(value)
}

pub fn validate_location_name<'a>(field: &str, raw: &'a str) -> Result<&'a str> {
    validate_text(field, raw, &LOCATION_NAME)
}

pub fn validate_cache_key(raw: &str) -> Result<&str> {
    validate_text("cache key", raw, &CACHE_KEY)
}

pub fn validate_client_id(raw: &str) -> Result<&str> {
    validate_text("client id", raw, &CLIENT_ID)
}

pub fn validate_latitude(latitude: f64) -> Result<f64> {
    validate_range("latitude", latitude, -90.0, 90.0)
}

pub fn validate_longitude(longitude: f64) -> Result<f64> {
    validate_range("longitude", longitude, -180.0, 180.0)
}

fn validate_range(field: &str, value: f64, min: f64, max: f64) -> Result<f64> {
    if !value.is_finite() || value < min || value > max {
        return Err(WeatherError::validation(
            field,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(value)
}

/// Check that `date` lies within the supported window around today (UTC).
pub fn validate_date(date: NaiveDate) -> Result<NaiveDate> {
    validate_date_relative_to(date, Utc::now().date_naive())
}

pub fn validate_date_relative_to(date: NaiveDate, today: NaiveDate) -> Result<NaiveDate> {
    let earliest = today - Duration::days(MAX_DAYS_PAST);
    let latest = today + Duration::days(MAX_DAYS_AHEAD);

    if date < earliest || date > latest {
        return Err(WeatherError::validation(
            "date",
            format!("must be between {earliest} and {latest}, got {date}"),
        ));
    }
    Ok(date)
}
