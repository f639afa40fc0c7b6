//! Chronological buckets (day / ISO week / month) for flow aggregation.
//!
//! Weeks are ISO 8601 weeks: they start on Monday 00:00 UTC and are labelled
//! by ISO week-year (`2019-W01` starts on 2018-12-31). Every window boundary
//! in the workspace goes through this module so cross-year comparisons stay
//! consistent.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::calendar::start_of_day;
use crate::interval::Interval;
use crate::model::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Default for Period {
    fn default() -> Self {
        Self::Week
    }
}

impl Period {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// First day of the bucket containing `date`.
    #[must_use]
    pub fn start_of(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => date
                .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
                .unwrap_or(date),
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// First day of the bucket following the one that starts at `start`.
    #[must_use]
    pub fn next_start(self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Day => start.checked_add_days(Days::new(1)),
            Self::Week => start.checked_add_days(Days::new(7)),
            Self::Month => start.checked_add_months(Months::new(1)),
        }
    }

    /// Stable label for the bucket starting at `start`.
    #[must_use]
    pub fn label(self, start: NaiveDate) -> String {
        match self {
            Self::Day => start.format("%Y-%m-%d").to_string(),
            Self::Week => {
                let iso = start.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            Self::Month => start.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            _ => Err(ParseEnumError {
                expected: "period",
                got: s.to_string(),
            }),
        }
    }
}

/// One half-open bucket `[start, end)` of a flow series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub period: Period,
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// The bucket of `period` that contains `date`.
    #[must_use]
    pub fn containing(period: Period, date: NaiveDate) -> Option<Self> {
        let first = period.start_of(date);
        let next = period.next_start(first)?;
        Some(Self {
            period,
            label: period.label(first),
            start: start_of_day(first)?,
            end: start_of_day(next)?,
        })
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    #[must_use]
    pub fn interval(&self) -> Option<Interval> {
        Interval::new(self.start, self.end)
    }
}

/// Contiguous windows covering `from..=to`, aligned to period boundaries.
#[must_use]
pub fn windows_between(from: NaiveDate, to: NaiveDate, period: Period) -> Vec<Window> {
    let mut windows = Vec::new();
    if to < from {
        return windows;
    }

    let mut cursor = Some(period.start_of(from));
    while let Some(day) = cursor {
        if day > to {
            break;
        }
        let Some(window) = Window::containing(period, day) else {
            break;
        };
        windows.push(window);
        cursor = period.next_start(day);
    }
    windows
}
