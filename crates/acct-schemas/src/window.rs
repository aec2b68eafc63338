//! Reporting window and instant normalisation.
//!
//! Every instant crossing a provider boundary is zone-naive UTC. Callers
//! holding zoned instants normalise with [`to_naive_utc`] first.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Canonical textual form used by watermark files and record output.
pub const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Returned when `to <= from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid window: to={to} must be after from={from}")]
pub struct InvalidWindowError {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

/// Half-open interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    from: NaiveDateTime,
    to: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Result<Self, InvalidWindowError> {
        if to <= from {
            return Err(InvalidWindowError { from, to });
        }
        Ok(Self { from, to })
    }

    /// Build a window from zoned instants, stripping the zone after converting to UTC.
    pub fn from_zoned<Tz: TimeZone>(
        from: &DateTime<Tz>,
        to: &DateTime<Tz>,
    ) -> Result<Self, InvalidWindowError> {
        Self::new(to_naive_utc(from), to_naive_utc(to))
    }

    pub fn from(&self) -> NaiveDateTime {
        self.from
    }

    pub fn to(&self) -> NaiveDateTime {
        self.to
    }

    /// A lifetime `[start, end-or-open)` overlaps iff `start < to` and
    /// (`end` is absent or `end >= from`).
    pub fn overlaps(&self, start: NaiveDateTime, end: Option<NaiveDateTime>) -> bool {
        start < self.to && end.map_or(true, |e| e >= self.from)
    }

    /// `max(start, from)`.
    pub fn clamp_start(&self, start: NaiveDateTime) -> NaiveDateTime {
        start.max(self.from)
    }

    pub fn length_secs(&self) -> i64 {
        (self.to - self.from).num_seconds()
    }
}

pub fn to_naive_utc<Tz: TimeZone>(dt: &DateTime<Tz>) -> NaiveDateTime {
    dt.with_timezone(&Utc).naive_utc()
}

/// Parse an instant in any of the shapes upstream providers and operators use:
///
/// - RFC 3339 with offset (`2023-01-01T10:00:00+02:00`, `...Z`), converted to UTC
/// - naive ISO datetime with `T` or space separator, optional fractional seconds
/// - bare date (`2023-01-01`), read as midnight
///
/// Returns `None` for anything else, including empty input.
pub fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(to_naive_utc(&dt));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Inverse of [`parse_instant`] for naive instants; round-trips exactly.
pub fn format_instant(dt: &NaiveDateTime) -> String {
    dt.format(INSTANT_FORMAT).to_string()
}
