//! Time sources
//!
//! The refresh cycle needs two readings per poll: the process's local
//! calendar date (for the daily rollover) and the current UTC instant (to
//! derive each feeder's own wall-clock time).

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Timelike, Utc};

/// Source of "now" for the coordinator
pub trait Clock: Send + Sync {
    /// Current instant
    fn now_utc(&self) -> DateTime<Utc>;

    /// The process's local calendar date
    fn local_today(&self) -> NaiveDate;
}

/// Wall clock of the running process
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Convert fractional hours into a fixed offset
///
/// Returns `None` when the offset is not within ±24 h.
pub fn offset_from_hours(hours: f64) -> Option<FixedOffset> {
    if !hours.is_finite() {
        return None;
    }
    let seconds = (hours * 3600.0).round();
    if seconds.abs() >= 86_400.0 {
        return None;
    }
    FixedOffset::east_opt(seconds as i32)
}

/// Seconds elapsed since local midnight at `offset`
pub fn feeder_local_seconds(now_utc: DateTime<Utc>, offset: FixedOffset) -> u32 {
    now_utc.with_timezone(&offset).num_seconds_from_midnight()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_seconds_follow_offset() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();

        let utc = offset_from_hours(0.0).unwrap();
        assert_eq!(feeder_local_seconds(now, utc), 23 * 3600 + 30 * 60);

        // 23:30 UTC is 05:00 the next morning in India
        let india = offset_from_hours(5.5).unwrap();
        assert_eq!(feeder_local_seconds(now, india), 5 * 3600);

        let new_york = offset_from_hours(-5.0).unwrap();
        assert_eq!(feeder_local_seconds(now, new_york), 18 * 3600 + 30 * 60);
    }

    #[test]
    fn test_offset_bounds() {
        assert!(offset_from_hours(24.0).is_none());
        assert!(offset_from_hours(f64::NAN).is_none());
        assert_eq!(offset_from_hours(-3.5).unwrap().local_minus_utc(), -12_600);
    }
}
