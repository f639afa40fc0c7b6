//! Effort attribution: intersect stage occupancy, assignments and blocks.
//!
//! For every transition into an effort-bearing stage the engine clips each
//! overlapping assignment to the transition, removes blocked and non-working
//! time, splits shared working time between concurrently assigned members
//! and scales the result by the stage's configured percentages.
//!
//! The output for one transition never exceeds that transition's business
//! hours minus its blocked business hours; records are scaled down together
//! when calendar rounding would push them over.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, instrument};

use flowlens_core::model::{
    Assignment, BlockInterval, EffortRecord, MemberRole, StageEffortConfig, StageId, StageStream,
    Transition, WorkItem,
};
use flowlens_core::repo::{FlowRepository, RepoError};
use flowlens_core::{Calendar, Interval, NonWorkingCalendar};

use crate::segments::{concurrency_segments, pairing_share};

const HOURS_TOLERANCE: f64 = 1e-9;

/// Everything recorded about one work item, ordered chronologically.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemHistory {
    pub item: WorkItem,
    pub transitions: Vec<Transition>,
    pub assignments: Vec<Assignment>,
    pub blocks: Vec<BlockInterval>,
}

impl WorkItemHistory {
    #[must_use]
    pub fn new(item: WorkItem) -> Self {
        Self {
            item,
            transitions: Vec::new(),
            assignments: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Fetch the item and its three timelines once.
    ///
    /// # Errors
    ///
    /// [`RepoError::ItemNotFound`] when the item does not exist.
    pub fn load<R: FlowRepository + ?Sized>(
        repo: &R,
        id: &flowlens_core::model::WorkItemId,
    ) -> Result<Self, RepoError> {
        let item = repo.work_item(id)?;
        Ok(Self {
            transitions: repo.transitions_for(id),
            assignments: repo.assignments_for(id),
            blocks: repo.blocks_for(id),
            item,
        })
    }
}

/// Stage stream and effort settings for the stages of one container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSettings {
    entries: HashMap<StageId, (StageStream, StageEffortConfig)>,
}

impl StageSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stage(
        mut self,
        stage_id: impl Into<StageId>,
        stream: StageStream,
        config: StageEffortConfig,
    ) -> Self {
        self.insert(stage_id.into(), stream, config);
        self
    }

    pub fn insert(&mut self, stage_id: StageId, stream: StageStream, config: StageEffortConfig) {
        self.entries.insert(stage_id, (stream, config));
    }

    /// Resolve the settings of every known stage for `container_id`.
    pub fn load<R: FlowRepository + ?Sized>(repo: &R, container_id: &str) -> Self {
        let entries = repo
            .stages()
            .into_iter()
            .map(|stage| {
                let config = repo.stage_config(container_id, &stage.id);
                (stage.id, (stage.stream, config))
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, stage_id: &StageId) -> Option<(StageStream, StageEffortConfig)> {
        self.entries.get(stage_id).copied()
    }
}

/// Builds effort records for one work item at a time.
#[derive(Debug, Clone, Default)]
pub struct EffortAttributionEngine {
    calendar: Calendar,
    non_working: NonWorkingCalendar,
}

impl EffortAttributionEngine {
    #[must_use]
    pub fn new(calendar: Calendar) -> Self {
        Self {
            calendar,
            non_working: NonWorkingCalendar::default(),
        }
    }

    /// Treat holidays and days off as blocked time.
    #[must_use]
    pub fn with_non_working(mut self, non_working: NonWorkingCalendar) -> Self {
        self.non_working = non_working;
        self
    }

    #[must_use]
    pub const fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// Compute the full effort record set for one item.
    ///
    /// Pure: the same history, settings and `now` always produce the same
    /// records in the same order.
    #[instrument(skip_all, fields(item = %history.item.id))]
    pub fn build_efforts_for(
        &self,
        history: &WorkItemHistory,
        settings: &StageSettings,
        now: DateTime<Utc>,
    ) -> Vec<EffortRecord> {
        let mut transitions: Vec<&Transition> = history.transitions.iter().collect();
        transitions.sort_by(|a, b| a.entered_at.cmp(&b.entered_at).then_with(|| a.id.cmp(&b.id)));

        let mut assignments: Vec<&Assignment> = history.assignments.iter().collect();
        assignments.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));

        let blocks: Vec<Interval> = history
            .blocks
            .iter()
            .filter_map(|block| block.interval(now))
            .collect();

        let mut records = Vec::new();
        for transition in transitions {
            let Some((stream, config)) = settings.get(&transition.stage_id) else {
                debug!(transition = %transition.id, stage = %transition.stage_id, "stage has no settings, skipping");
                continue;
            };
            if !config.effort_bearing {
                continue;
            }
            records.extend(self.efforts_in_transition(
                history,
                transition,
                stream,
                &config,
                &assignments,
                &blocks,
                now,
            ));
        }

        debug!(records = records.len(), "effort records built");
        records
    }

    #[allow(clippy::too_many_arguments)]
    fn efforts_in_transition(
        &self,
        history: &WorkItemHistory,
        transition: &Transition,
        stream: StageStream,
        config: &StageEffortConfig,
        assignments: &[&Assignment],
        blocks: &[Interval],
        now: DateTime<Utc>,
    ) -> Vec<EffortRecord> {
        let Some(window) = transition.interval(now) else {
            debug!(transition = %transition.id, "empty transition interval");
            return Vec::new();
        };

        let clipped: Vec<(&Assignment, Interval)> = assignments
            .iter()
            .filter_map(|assignment| {
                let interval = assignment.interval(now)?;
                interval.intersect(&window).map(|clip| (*assignment, clip))
            })
            .collect();
        if clipped.is_empty() {
            return Vec::new();
        }

        let blocked = self.blocked_within(&window, blocks);
        let active: Vec<(&str, Interval)> = clipped
            .iter()
            .map(|(assignment, clip)| (assignment.member.id.as_str(), *clip))
            .collect();

        let stage_fraction = config.stage_fraction();
        let pairing_fraction = config.pairing_fraction();
        let management_fraction = config.management_fraction();

        let mut records: Vec<EffortRecord> = clipped
            .iter()
            .filter_map(|(assignment, clip)| {
                let blocked_in_clip: Vec<Interval> = blocked
                    .iter()
                    .filter_map(|hole| hole.intersect(clip))
                    .collect();
                let blocked_hours = self.calendar.total_hours(&blocked_in_clip);
                let raw_hours = (self.calendar.interval_hours(clip) - blocked_hours).max(0.0);
                if raw_hours <= HOURS_TOLERANCE {
                    return None;
                }

                let segments = concurrency_segments(clip, &active);
                let pairing = pairing_share(&segments, &blocked_in_clip, pairing_fraction);
                let role_fraction = if assignment.member.role == MemberRole::Manager {
                    management_fraction
                } else {
                    1.0
                };

                Some(EffortRecord {
                    work_item_id: history.item.id.clone(),
                    transition_id: transition.id.clone(),
                    assignment_id: assignment.id.clone(),
                    member_id: assignment.member.id.clone(),
                    member_role: assignment.member.role,
                    stage_stream: stream,
                    start: clip.start,
                    end: clip.end,
                    raw_hours,
                    blocked_hours,
                    pairing_members: pairing.members,
                    stage_percentage: stage_fraction,
                    pairing_percentage: pairing_fraction,
                    management_percentage: management_fraction,
                    net_effort_value: raw_hours * pairing.factor * stage_fraction * role_fraction,
                })
            })
            .collect();

        let budget = (self.calendar.interval_hours(&window)
            - self.calendar.total_hours(&blocked))
        .max(0.0);
        cap_to_budget(&mut records, budget, &transition.id);
        records
    }

    /// Blocks and non-working days inside `window`, merged.
    fn blocked_within(&self, window: &Interval, blocks: &[Interval]) -> Vec<Interval> {
        let mut holes: Vec<Interval> = blocks
            .iter()
            .filter_map(|block| block.intersect(window))
            .collect();
        if !self.non_working.is_empty() {
            holes.extend(self.non_working.excluded_within(window));
        }
        Interval::union_all(holes)
    }
}

fn cap_to_budget(records: &mut [EffortRecord], budget: f64, transition_id: &str) {
    let total: f64 = records.iter().map(|record| record.net_effort_value).sum();
    if total <= budget + HOURS_TOLERANCE || total <= 0.0 {
        return;
    }
    let scale = budget / total;
    debug!(
        transition = transition_id,
        total, budget, "effort exceeds transition hours, scaling down"
    );
    for record in records {
        record.net_effort_value *= scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flowlens_core::model::{TeamMember, WorkItemId};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        // January 2024: the 8th is a Monday.
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0)
            .single()
            .expect("valid date")
    }

    fn member(id: &str, role: MemberRole) -> TeamMember {
        TeamMember {
            id: id.to_string(),
            name: id.to_string(),
            role,
        }
    }

    fn transition(id: &str, stage: &str, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> Transition {
        Transition {
            id: id.to_string(),
            work_item_id: WorkItemId::new("D-1"),
            stage_id: StageId::new(stage),
            entered_at: from,
            exited_at: to,
        }
    }

    fn assignment(
        id: &str,
        who: TeamMember,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Assignment {
        Assignment {
            id: id.to_string(),
            work_item_id: WorkItemId::new("D-1"),
            member: who,
            started_at: from,
            finished_at: to,
        }
    }

    fn settings() -> StageSettings {
        StageSettings::new()
            .with_stage("dev", StageStream::Downstream, StageEffortConfig::full())
            .with_stage(
                "analysis",
                StageStream::Upstream,
                StageEffortConfig {
                    effort_bearing: true,
                    stage_percentage: Some(0.5),
                    management_percentage: Some(0.2),
                    pairing_percentage: Some(1.0),
                },
            )
            .with_stage(
                "waiting",
                StageStream::Downstream,
                StageEffortConfig::default(),
            )
    }

    fn history() -> WorkItemHistory {
        WorkItemHistory::new(WorkItem::new("D-1", at(8, 8)))
    }

    #[test]
    fn assignment_before_transition_is_clipped_to_entry() {
        let mut history = history();
        history.transitions = vec![transition("t1", "dev", at(8, 10), Some(at(8, 14)))];
        history.assignments = vec![assignment(
            "a1",
            member("ana", MemberRole::Developer),
            at(8, 8),
            Some(at(8, 12)),
        )];

        let records =
            EffortAttributionEngine::default().build_efforts_for(&history, &settings(), at(9, 0));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].start, at(8, 10));
        assert_eq!(records[0].end, at(8, 12));
        assert!((records[0].raw_hours - 2.0).abs() < 1e-9);
        assert!((records[0].net_effort_value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn open_assignment_runs_through_now() {
        let mut history = history();
        history.transitions = vec![transition("t1", "dev", at(8, 9), None)];
        history.assignments = vec![assignment(
            "a1",
            member("ana", MemberRole::Developer),
            at(8, 9),
            None,
        )];

        let records =
            EffortAttributionEngine::default().build_efforts_for(&history, &settings(), at(8, 15));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].end, at(8, 15));
        assert!((records[0].raw_hours - 6.0).abs() < 1e-9);
    }

    #[test]
    fn one_record_per_transition() {
        let mut history = history();
        history.transitions = vec![
            transition("t1", "analysis", at(8, 9), Some(at(8, 12))),
            transition("t2", "dev", at(8, 12), Some(at(8, 17))),
        ];
        history.assignments = vec![assignment(
            "a1",
            member("ana", MemberRole::Developer),
            at(8, 9),
            Some(at(8, 17)),
        )];

        let records =
            EffortAttributionEngine::default().build_efforts_for(&history, &settings(), at(9, 0));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].transition_id, "t1");
        assert_eq!(records[0].stage_stream, StageStream::Upstream);
        assert!((records[0].net_effort_value - 1.5).abs() < 1e-9);
        assert_eq!(records[1].transition_id, "t2");
        assert!((records[1].net_effort_value - 5.0).abs() < 1e-9);
    }

    #[test]
    fn non_effort_stage_and_unknown_stage_are_skipped() {
        let mut history = history();
        history.transitions = vec![
            transition("t1", "waiting", at(8, 9), Some(at(8, 12))),
            transition("t2", "mystery", at(8, 12), Some(at(8, 14))),
        ];
        history.assignments = vec![assignment(
            "a1",
            member("ana", MemberRole::Developer),
            at(8, 9),
            None,
        )];

        let records =
            EffortAttributionEngine::default().build_efforts_for(&history, &settings(), at(9, 0));
        assert!(records.is_empty());
    }

    #[test]
    fn zero_stage_percentage_still_emits_audit_record() {
        let settings = StageSettings::new().with_stage(
            "dev",
            StageStream::Downstream,
            StageEffortConfig {
                effort_bearing: true,
                ..StageEffortConfig::default()
            },
        );
        let mut history = history();
        history.transitions = vec![transition("t1", "dev", at(8, 9), Some(at(8, 12)))];
        history.assignments = vec![assignment(
            "a1",
            member("ana", MemberRole::Developer),
            at(8, 9),
            None,
        )];

        let records =
            EffortAttributionEngine::default().build_efforts_for(&history, &settings, at(9, 0));
        assert_eq!(records.len(), 1);
        assert!((records[0].raw_hours - 3.0).abs() < 1e-9);
        assert!(records[0].net_effort_value.abs() < f64::EPSILON);
    }

    #[test]
    fn manager_effort_uses_management_percentage() {
        let mut history = history();
        history.transitions = vec![transition("t1", "analysis", at(8, 9), Some(at(8, 13)))];
        history.assignments = vec![assignment(
            "a1",
            member("mo", MemberRole::Manager),
            at(8, 9),
            None,
        )];

        let records =
            EffortAttributionEngine::default().build_efforts_for(&history, &settings(), at(9, 0));
        // 4h * 50% stage * 20% management
        assert!((records[0].net_effort_value - 0.4).abs() < 1e-9);
    }

    #[test]
    fn non_working_days_count_as_blocked() {
        let mut history = history();
        history.transitions = vec![transition("t1", "dev", at(8, 0), Some(at(10, 0)))];
        history.assignments = vec![assignment(
            "a1",
            member("ana", MemberRole::Developer),
            at(8, 0),
            None,
        )];
        let day_off = flowlens_core::DayOffRange {
            from: at(8, 0).date_naive(),
            to: at(8, 0).date_naive(),
            reason: None,
        };
        let engine = EffortAttributionEngine::default()
            .with_non_working(NonWorkingCalendar::new(vec![day_off]));

        let records = engine.build_efforts_for(&history, &settings(), at(11, 0));
        // Monday is off: 16h over two weekdays minus the 8h day off.
        assert_eq!(records.len(), 1);
        assert!((records[0].blocked_hours - 8.0).abs() < 1e-9);
        assert!((records[0].raw_hours - 8.0).abs() < 1e-9);
    }

    #[test]
    fn sequential_assignments_never_exceed_transition_hours() {
        let mut history = history();
        history.transitions = vec![transition("t1", "dev", at(8, 9), Some(at(9, 9)))];
        history.assignments = vec![
            assignment("a1", member("ana", MemberRole::Developer), at(8, 9), Some(at(8, 18))),
            assignment("a2", member("bo", MemberRole::Developer), at(8, 18), Some(at(9, 9))),
        ];

        let engine = EffortAttributionEngine::default();
        let records = engine.build_efforts_for(&history, &settings(), at(10, 0));
        let total: f64 = records.iter().map(|r| r.net_effort_value).sum();
        let budget = engine.calendar().business_hours_between(at(8, 9), at(9, 9));
        assert_eq!(records.len(), 2);
        assert!(total <= budget + 1e-9, "total {total} > budget {budget}");
    }
}
