//! Business-calendar duration arithmetic.
//!
//! [`Calendar::business_hours`] is the single source of truth for "how many
//! working hours passed between two instants". It knows about weekends only;
//! holidays and team days off are modelled by [`NonWorkingCalendar`], which
//! callers subtract around it.
//!
//! # Rules
//!
//! - Missing bounds or `end <= start` yield `0.0`.
//! - Both instants on the same UTC calendar day: plain wall-clock hours.
//! - Otherwise the span is cut at UTC midnights, every Monday-Friday piece
//!   contributes its wall-clock hours, weekend pieces contribute nothing,
//!   and the total is scaled from 24-hour days to the configured working
//!   day (`hours_per_day`, default 8).

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::interval::Interval;

/// Working hours in a business day unless configured otherwise.
pub const DEFAULT_HOURS_PER_DAY: f64 = 8.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
const HOURS_PER_CALENDAR_DAY: f64 = 24.0;

/// Weekend-aware business-hours calculator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    hours_per_day: f64,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            hours_per_day: DEFAULT_HOURS_PER_DAY,
        }
    }
}

impl Calendar {
    /// Build a calendar with a custom working-day length.
    ///
    /// Non-finite or non-positive values fall back to
    /// [`DEFAULT_HOURS_PER_DAY`]; values above 24 are clamped.
    #[must_use]
    pub fn new(hours_per_day: f64) -> Self {
        let hours_per_day = if hours_per_day.is_finite() && hours_per_day > 0.0 {
            hours_per_day.min(HOURS_PER_CALENDAR_DAY)
        } else {
            DEFAULT_HOURS_PER_DAY
        };
        Self { hours_per_day }
    }

    #[must_use]
    pub const fn hours_per_day(&self) -> f64 {
        self.hours_per_day
    }

    /// Business hours between two optional instants.
    #[must_use]
    pub fn business_hours(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> f64 {
        match (start, end) {
            (Some(start), Some(end)) => self.business_hours_between(start, end),
            _ => 0.0,
        }
    }

    /// Business hours between two instants.
    #[must_use]
    pub fn business_hours_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        if end <= start {
            return 0.0;
        }

        if start.date_naive() == end.date_naive() {
            return wall_clock_hours(start, end);
        }

        working_day_hours(start, end) * self.hours_per_day / HOURS_PER_CALENDAR_DAY
    }

    /// Business hours covered by an interval.
    #[must_use]
    pub fn interval_hours(&self, interval: &Interval) -> f64 {
        self.business_hours_between(interval.start, interval.end)
    }

    /// Sum of business hours over a set of intervals.
    ///
    /// Callers are expected to pass disjoint intervals (see
    /// [`Interval::union_all`]); overlapping input is counted twice.
    #[must_use]
    pub fn total_hours<'a>(&self, intervals: impl IntoIterator<Item = &'a Interval>) -> f64 {
        intervals
            .into_iter()
            .map(|interval| self.interval_hours(interval))
            .sum()
    }
}

/// Returns `true` for Monday through Friday.
#[must_use]
pub const fn is_working_day(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Wall-clock hours between two instants, negative spans clamp to zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn wall_clock_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / MILLIS_PER_HOUR
}

/// UTC midnight at the start of `date`.
#[must_use]
pub fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Wall-clock hours of `[start, end)` that fall on Monday through Friday.
#[must_use]
pub fn working_day_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let mut total = 0.0;
    let mut cursor = start;

    while cursor < end {
        let next_midnight = cursor
            .date_naive()
            .succ_opt()
            .and_then(start_of_day)
            .unwrap_or(end);
        let piece_end = next_midnight.min(end);

        if is_working_day(cursor.weekday()) {
            total += wall_clock_hours(cursor, piece_end);
        }
        cursor = piece_end;
    }

    total
}

// ---------------------------------------------------------------------------
// Non-working calendar exceptions
// ---------------------------------------------------------------------------

/// An inclusive range of calendar days nobody works (holiday, team day off).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOffRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

impl DayOffRange {
    /// The range as a half-open UTC interval `[from 00:00, to+1 00:00)`.
    #[must_use]
    pub fn as_interval(&self) -> Option<Interval> {
        let (first, last) = if self.from <= self.to {
            (self.from, self.to)
        } else {
            (self.to, self.from)
        };
        let start = start_of_day(first)?;
        let end = start_of_day(last.succ_opt()?)?;
        Interval::new(start, end)
    }
}

/// Externally supplied set of non-working days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonWorkingCalendar {
    #[serde(default)]
    pub days_off: Vec<DayOffRange>,
}

impl NonWorkingCalendar {
    #[must_use]
    pub const fn new(days_off: Vec<DayOffRange>) -> Self {
        Self { days_off }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days_off.is_empty()
    }

    /// Excluded intervals clipped to `window`, merged and sorted.
    #[must_use]
    pub fn excluded_within(&self, window: &Interval) -> Vec<Interval> {
        let clipped = self
            .days_off
            .iter()
            .filter_map(DayOffRange::as_interval)
            .filter_map(|interval| interval.intersect(window))
            .collect();
        Interval::union_all(clipped)
    }

    /// Returns `true` when `date` falls inside any day-off range.
    #[must_use]
    pub fn is_day_off(&self, date: NaiveDate) -> bool {
        self.days_off.iter().any(|range| {
            let (first, last) = if range.from <= range.to {
                (range.from, range.to)
            } else {
                (range.to, range.from)
            };
            first <= date && date <= last
        })
    }
}
