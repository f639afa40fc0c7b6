use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MemberRole, StageStream, WorkItemId};

/// Effort one assignment contributed while the item sat in one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffortRecord {
    pub work_item_id: WorkItemId,
    pub transition_id: String,
    pub assignment_id: String,
    pub member_id: String,
    pub member_role: MemberRole,
    pub stage_stream: StageStream,
    /// Start of the assignment/transition intersection.
    pub start: DateTime<Utc>,
    /// End of the assignment/transition intersection.
    pub end: DateTime<Utc>,
    /// Unblocked business hours of the intersection.
    pub raw_hours: f64,
    pub blocked_hours: f64,
    /// Largest number of members assigned at once inside the intersection.
    pub pairing_members: usize,
    pub stage_percentage: f64,
    pub pairing_percentage: f64,
    pub management_percentage: f64,
    pub net_effort_value: f64,
}

impl EffortRecord {
    /// Idempotency key: one record per (assignment, transition, start).
    #[must_use]
    pub fn key(&self) -> (&str, &str, DateTime<Utc>) {
        (&self.assignment_id, &self.transition_id, self.start)
    }
}

/// Cached effort totals on a work item, in business hours.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EffortTotals {
    pub upstream: f64,
    pub downstream: f64,
    pub development: f64,
    pub design: f64,
    pub management: f64,
}

impl EffortTotals {
    /// Sum records by stage stream and by member role.
    ///
    /// Client effort counts toward the stream totals only.
    #[must_use]
    pub fn from_records(records: &[EffortRecord]) -> Self {
        records.iter().fold(Self::default(), |mut totals, record| {
            let value = record.net_effort_value;
            match record.stage_stream {
                StageStream::Upstream => totals.upstream += value,
                StageStream::Downstream => totals.downstream += value,
            }
            match record.member_role {
                MemberRole::Developer => totals.development += value,
                MemberRole::Designer => totals.design += value,
                MemberRole::Manager => totals.management += value,
                MemberRole::Client => {}
            }
            totals
        })
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.upstream + self.downstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(stream: StageStream, role: MemberRole, value: f64) -> EffortRecord {
        let start = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).single().expect("date");
        EffortRecord {
            work_item_id: WorkItemId::new("D-1"),
            transition_id: "t".to_string(),
            assignment_id: "a".to_string(),
            member_id: "m".to_string(),
            member_role: role,
            stage_stream: stream,
            start,
            end: start,
            raw_hours: value,
            blocked_hours: 0.0,
            pairing_members: 1,
            stage_percentage: 1.0,
            pairing_percentage: 1.0,
            management_percentage: 1.0,
            net_effort_value: value,
        }
    }

    #[test]
    fn totals_split_by_stream_and_role() {
        let totals = EffortTotals::from_records(&[
            record(StageStream::Upstream, MemberRole::Designer, 2.0),
            record(StageStream::Downstream, MemberRole::Developer, 5.0),
            record(StageStream::Downstream, MemberRole::Manager, 1.0),
            record(StageStream::Downstream, MemberRole::Client, 0.5),
        ]);
        assert!((totals.upstream - 2.0).abs() < 1e-9);
        assert!((totals.downstream - 6.5).abs() < 1e-9);
        assert!((totals.development - 5.0).abs() < 1e-9);
        assert!((totals.design - 2.0).abs() < 1e-9);
        assert!((totals.management - 1.0).abs() < 1e-9);
        assert!((totals.total() - 8.5).abs() < 1e-9);
    }

    #[test]
    fn empty_records_are_zero() {
        assert_eq!(EffortTotals::from_records(&[]), EffortTotals::default());
    }
}
