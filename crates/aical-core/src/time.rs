//! Time windows bounding which remote events are reconciled.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Returns the window covering the current and the following week.
    ///
    /// The window starts at midnight on the Monday of the week containing
    /// `now` (as seen in `tz`) and ends at midnight after the Sunday of the
    /// following week, i.e. fourteen days later.
    pub fn rolling_fortnight<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> Self {
        let today = now.with_timezone(tz).date_naive();
        let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        Self {
            start: local_midnight(monday, tz),
            end: local_midnight(monday + Duration::days(14), tz),
        }
    }

    /// Returns the duration of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns true if `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Returns true if `[start, end)` overlaps the window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

// Midnight can be skipped by a DST transition; fall back to the naive
// instant read as UTC in that case.
fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn fortnight_from_midweek() {
        // 2024-05-15 is a Wednesday.
        let window = TimeWindow::rolling_fortnight(utc(2024, 5, 15, 10, 30), &Utc);
        assert_eq!(window.start, utc(2024, 5, 13, 0, 0));
        assert_eq!(window.end, utc(2024, 5, 27, 0, 0));
        assert_eq!(window.duration(), Duration::days(14));
    }

    #[test]
    fn fortnight_on_monday_midnight() {
        let window = TimeWindow::rolling_fortnight(utc(2024, 5, 13, 0, 0), &Utc);
        assert_eq!(window.start, utc(2024, 5, 13, 0, 0));
    }

    #[test]
    fn fortnight_on_sunday_stays_in_current_week() {
        let window = TimeWindow::rolling_fortnight(utc(2024, 5, 19, 23, 59), &Utc);
        assert_eq!(window.start, utc(2024, 5, 13, 0, 0));
        assert_eq!(window.end, utc(2024, 5, 27, 0, 0));
    }

    #[test]
    fn fortnight_respects_timezone() {
        // Sunday 23:00 UTC is already Monday 01:00 at +02:00.
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let window = TimeWindow::rolling_fortnight(utc(2024, 5, 12, 23, 0), &tz);
        assert_eq!(window.start, utc(2024, 5, 12, 22, 0));
        assert_eq!(window.end, utc(2024, 5, 26, 22, 0));
    }

    #[test]
    fn window_is_half_open() {
        let window = TimeWindow::new(utc(2024, 5, 13, 0, 0), utc(2024, 5, 14, 0, 0));
        assert!(window.contains(utc(2024, 5, 13, 0, 0)));
        assert!(window.contains(utc(2024, 5, 13, 23, 59)));
        assert!(!window.contains(utc(2024, 5, 14, 0, 0)));
    }

    #[test]
    fn overlap_checks() {
        let window = TimeWindow::new(utc(2024, 5, 13, 0, 0), utc(2024, 5, 14, 0, 0));
        assert!(window.overlaps(utc(2024, 5, 12, 23, 0), utc(2024, 5, 13, 1, 0)));
        assert!(!window.overlaps(utc(2024, 5, 14, 0, 0), utc(2024, 5, 14, 1, 0)));
        assert!(!window.overlaps(utc(2024, 5, 12, 0, 0), utc(2024, 5, 13, 0, 0)));
    }

    #[test]
    #[should_panic(expected = "TimeWindow start must be <= end")]
    fn inverted_window_panics() {
        TimeWindow::new(utc(2024, 5, 14, 0, 0), utc(2024, 5, 13, 0, 0));
    }
}
