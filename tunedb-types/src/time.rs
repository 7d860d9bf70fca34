//! Durations and timestamps, both stored as floating-point seconds.

use std::fmt::Write;
use std::sync::LazyLock;

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;

use crate::types::{Affinity, Float, QueryKind, Type};
use crate::value::Value;

/// Pattern used by [`DateType::default`].
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static MINUTES_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):([0-5]\d)$").expect("M:SS pattern is valid"));

/// A time interval in seconds, displayed as `M:SS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationType {
    raw_length: bool,
}

impl DurationType {
    /// With `raw_length`, values are displayed as plain seconds instead of `M:SS`.
    pub const fn new(raw_length: bool) -> Self {
        Self { raw_length }
    }
}

impl Type for DurationType {
    fn affinity(&self) -> Affinity {
        Affinity::Real
    }

    fn null(&self) -> Value {
        Value::Real(0.0)
    }

    fn normalize(&self, value: Value) -> Value {
        Float::new(1).normalize(value)
    }

    /// Accepts `M:SS` or a bare number of seconds.
    fn parse(&self, text: &str) -> Value {
        let text = text.trim();
        if let Some(caps) = MINUTES_SECONDS.captures(text) {
            let minutes: f64 = caps[1].parse().unwrap_or_default();
            let seconds: f64 = caps[2].parse().unwrap_or_default();
            return Value::Real(minutes * 60.0 + seconds);
        }
        match text.parse::<f64>() {
            Ok(f) => Value::Real(f),
            Err(_) => self.null(),
        }
    }

    fn format(&self, value: &Value) -> String {
        let seconds = value.as_f64().unwrap_or(0.0);
        if self.raw_length {
            return Value::Real(seconds).to_text().unwrap_or_default();
        }
        let interval = seconds.trunc() as i64;
        format!("{}:{:02}", interval / 60, interval % 60)
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Numeric
    }
}

/// A point in time as a Unix timestamp, displayed and parsed in local time
/// through a strftime-style pattern.
#[derive(Debug, Clone)]
pub struct DateType {
    pattern: String,
}

impl DateType {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn parse_formatted(&self, text: &str) -> Option<f64> {
        let naive = NaiveDateTime::parse_from_str(text, &self.pattern).ok().or_else(|| {
            NaiveDate::parse_from_str(text, &self.pattern)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
        let local = Local.from_local_datetime(&naive).earliest()?;
        Some(local.timestamp() as f64 + f64::from(local.timestamp_subsec_micros()) / 1e6)
    }
}

impl Default for DateType {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_FORMAT)
    }
}

impl Type for DateType {
    fn affinity(&self) -> Affinity {
        Affinity::Real
    }

    fn null(&self) -> Value {
        Value::Real(0.0)
    }

    fn normalize(&self, value: Value) -> Value {
        Float::new(1).normalize(value)
    }

    /// Falls back to a raw numeric timestamp when the text does not match
    /// the pattern.
    fn parse(&self, text: &str) -> Value {
        let text = text.trim();
        if let Some(ts) = self.parse_formatted(text) {
            return Value::Real(ts);
        }
        match text.parse::<f64>() {
            Ok(f) => Value::Real(f),
            Err(_) => self.null(),
        }
    }

    fn format(&self, value: &Value) -> String {
        let seconds = value.as_f64().unwrap_or(0.0);
        let raw = || Value::Real(seconds).to_text().unwrap_or_default();

        let items: Vec<Item<'_>> = StrftimeItems::new(&self.pattern).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return raw();
        }
        let whole = seconds.floor();
        let nanos = ((seconds - whole) * 1e9) as u32;
        let Some(local) = Local.timestamp_opt(whole as i64, nanos).earliest() else {
            return raw();
        };

        let mut out = String::new();
        match write!(out, "{}", local.format_with_items(items.iter())) {
            Ok(()) => out,
            Err(_) => raw(),
        }
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Numeric
    }
}
