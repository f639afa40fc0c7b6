//! Half-open UTC time intervals and the set operations the attribution
//! engine needs (intersection, union, subtraction).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A non-empty half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Build an interval, or `None` when `end <= start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    /// Interval with an optional end, closed at `now` when the end is missing.
    #[must_use]
    pub fn open_ended(
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        Self::new(start, end.unwrap_or(now))
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        Self::new(self.start.max(other.start), self.end.min(other.end))
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Merge overlapping or touching intervals into a sorted disjoint set.
    #[must_use]
    pub fn union_all(mut intervals: Vec<Self>) -> Vec<Self> {
        intervals.sort_unstable();
        let mut merged: Vec<Self> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if interval.start <= last.end => {
                    last.end = last.end.max(interval.end);
                }
                _ => merged.push(interval),
            }
        }
        merged
    }

    /// Parts of `self` not covered by any of the (sorted, disjoint) `holes`.
    #[must_use]
    pub fn subtract(&self, holes: &[Self]) -> Vec<Self> {
        let mut remaining = Vec::new();
        let mut cursor = self.start;
        for hole in holes {
            if hole.end <= cursor || hole.start >= self.end {
                continue;
            }
            if hole.start > cursor {
                remaining.push(Self {
                    start: cursor,
                    end: hole.start,
                });
            }
            cursor = cursor.max(hole.end);
            if cursor >= self.end {
                break;
            }
        }
        if cursor < self.end {
            remaining.push(Self {
                start: cursor,
                end: self.end,
            });
        }
        remaining
    }
}
