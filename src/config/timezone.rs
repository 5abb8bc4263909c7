//! Timezone override for schedule evaluation

use crate::clock::offset_from_hours;
use crate::error::PetkitError;
use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value that selects per-feeder offsets
pub const SET_AUTOMATICALLY: &str = "Set Automatically";

/// How a feeder's local wall clock is determined
///
/// Anything other than [`TimezoneSetting::Automatic`] is applied to every
/// feeder on the account alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimezoneSetting {
    /// Use each feeder's own reported UTC offset
    #[default]
    Automatic,
    /// One fixed offset for all feeders
    Fixed(FixedOffset),
    /// IANA zone, DST resolved at evaluation time
    Named(Tz),
}

impl TimezoneSetting {
    /// Offset to evaluate a feeder's schedule against at `now`
    ///
    /// `None` only when automatic mode meets an out-of-range device offset.
    pub fn offset_for(&self, feeder_offset_hours: f64, now: DateTime<Utc>) -> Option<FixedOffset> {
        match self {
            TimezoneSetting::Automatic => offset_from_hours(feeder_offset_hours),
            TimezoneSetting::Fixed(offset) => Some(*offset),
            TimezoneSetting::Named(tz) => Some(tz.offset_from_utc_datetime(&now.naive_utc()).fix()),
        }
    }

    /// Name sent to the vendor at login, if any
    pub fn vendor_name(&self) -> Option<String> {
        match self {
            TimezoneSetting::Automatic => None,
            TimezoneSetting::Fixed(offset) => Some(offset.to_string()),
            TimezoneSetting::Named(tz) => Some(tz.name().to_string()),
        }
    }
}

impl FromStr for TimezoneSetting {
    type Err = PetkitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(SET_AUTOMATICALLY)
            || trimmed.eq_ignore_ascii_case("auto")
            || trimmed.is_empty()
        {
            return Ok(TimezoneSetting::Automatic);
        }

        if let Some(offset) = parse_fixed_offset(trimmed) {
            return Ok(TimezoneSetting::Fixed(offset));
        }

        trimmed
            .parse::<Tz>()
            .map(TimezoneSetting::Named)
            .map_err(|_| PetkitError::config(format!("Unrecognised timezone '{trimmed}'")))
    }
}

impl TryFrom<String> for TimezoneSetting {
    type Error = PetkitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimezoneSetting> for String {
    fn from(value: TimezoneSetting) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimezoneSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimezoneSetting::Automatic => f.write_str(SET_AUTOMATICALLY),
            TimezoneSetting::Fixed(offset) => write!(f, "{offset}"),
            TimezoneSetting::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// Accepts `UTC`, `+05:30`, `-3`, `UTC+2`, `UTC-03:30` and bare hours like `5.5`
fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let body = s
        .strip_prefix("UTC")
        .or_else(|| s.strip_prefix("utc"))
        .or_else(|| s.strip_prefix("GMT"))
        .unwrap_or(s);

    if body.is_empty() {
        return FixedOffset::east_opt(0);
    }

    if let Some((hours, minutes)) = body.split_once(':') {
        let negative = hours.starts_with('-');
        let hours: i32 = hours.trim_start_matches(['+', '-']).parse().ok()?;
        let minutes: i32 = minutes.parse().ok()?;
        if hours >= 24 || minutes >= 60 {
            return None;
        }
        let seconds = hours * 3600 + minutes * 60;
        return FixedOffset::east_opt(if negative { -seconds } else { seconds });
    }

    body.parse::<f64>().ok().and_then(offset_from_hours)
}
