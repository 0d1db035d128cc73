//! Frame header values and the canonical per-frame fields resolved from them.
//!
//! A [`Header`] is the keyword/value subset of a FITS header that the
//! photometry pipeline needs: world-coordinate keywords plus whatever
//! telescope-specific keywords carry exposure, timing, and detector
//! properties. [`HeaderFields`] is the canonical, telescope-independent view
//! produced by [`KeywordMap::resolve`](crate::telescope::KeywordMap::resolve).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Seconds in one day; header exposure times are stored in days.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Julian Date of the Unix epoch (1970-01-01T00:00:00 UTC).
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Parsed header keyword value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Float(f64),
    Int(i64),
    Str(String),
    Bool(bool),
}

impl HeaderValue {
    /// Numeric view of the value. Integers are widened; strings are parsed
    /// when they hold a plain number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(f) => Some(*f),
            HeaderValue::Int(i) => Some(*i as f64),
            HeaderValue::Str(s) => s.trim().parse().ok(),
            HeaderValue::Bool(_) => None,
        }
    }

    /// String view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Int(v) => write!(f, "{v}"),
            HeaderValue::Str(v) => write!(f, "{v}"),
            HeaderValue::Bool(v) => write!(f, "{}", if *v { "T" } else { "F" }),
        }
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Str(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Str(v)
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Bool(v)
    }
}

/// Keyword → value map for a single frame.
///
/// Keywords are stored upper-case, as FITS requires.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: HashMap<String, HeaderValue>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a keyword.
    pub fn insert(&mut self, keyword: &str, value: impl Into<HeaderValue>) {
        self.cards
            .insert(keyword.trim().to_ascii_uppercase(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, keyword: &str, value: impl Into<HeaderValue>) -> Self {
        self.insert(keyword, value);
        self
    }

    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards.get(&keyword.trim().to_ascii_uppercase())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(HeaderValue::as_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        match self.get(keyword)? {
            HeaderValue::Int(i) => Some(*i),
            HeaderValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            HeaderValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(HeaderValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Canonical per-frame fields, independent of the telescope's keyword names.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFields {
    /// Exposure time in days.
    pub exposure_days: f64,
    /// Observation time in days (BTJD, JD, ... whatever scale the header uses).
    pub observation_time: f64,
    /// Camera / instrument identifier.
    pub instrument: String,
    /// Detector readout noise (electrons).
    pub readout_noise: f64,
    /// Detector gain (electrons per ADU).
    pub gain: f64,
}

impl HeaderFields {
    /// Exposure time in seconds.
    pub fn exposure_seconds(&self) -> f64 {
        self.exposure_days * SECONDS_PER_DAY
    }
}

/// Interpret a header value as a time in days.
///
/// Numeric values are returned unchanged. ISO-8601 strings (`DATE-OBS` style,
/// with or without a UTC offset, or a bare date) are converted to Julian Date.
pub fn observation_time_days(value: &HeaderValue) -> Option<f64> {
    if let Some(days) = value.as_f64() {
        return Some(days);
    }
    let text = value.as_str()?.trim();

    let unix_seconds = if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) * 1e-9
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        let utc = dt.and_utc();
        utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) * 1e-9
    } else if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        d.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64
    } else {
        return None;
    };

    Some(unix_seconds / SECONDS_PER_DAY + UNIX_EPOCH_JD)
}
