//! Narrow read/write contracts between the engine and the persistence layer.
//!
//! The engine never builds queries: repositories hand back materialized,
//! already-filtered and already-ordered `Vec`s.

pub mod dataset;
pub mod memory;

use chrono::{DateTime, Utc};

use crate::calendar::NonWorkingCalendar;
use crate::error::ErrorCode;
use crate::model::{
    Assignment, BlockInterval, EffortRecord, EffortTotals, Stage, StageEffortConfig, StageId,
    Transition, WorkItem, WorkItemId,
};

pub use dataset::{Dataset, ModelError, StageConfigEntry};
pub use memory::InMemoryRepository;

/// Errors raised by repository implementations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("work item not found: {0}")]
    ItemNotFound(WorkItemId),

    #[error("repository state poisoned by a panicked writer")]
    Poisoned,
}

impl RepoError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ItemNotFound(_) => ErrorCode::ItemNotFound,
            Self::Poisoned => ErrorCode::InternalUnexpected,
        }
    }
}

/// Ordered read access to work items, their timelines and stage settings.
pub trait FlowRepository {
    fn work_item(&self, id: &WorkItemId) -> Result<WorkItem, RepoError>;

    /// All work items ordered by creation time.
    fn work_items(&self) -> Vec<WorkItem>;

    /// Items created at or before `to` that were not completed or
    /// discarded before `from`, ordered by creation time.
    fn work_items_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<WorkItem>;

    /// Transitions of one item ordered by entry time.
    fn transitions_for(&self, id: &WorkItemId) -> Vec<Transition>;

    /// Assignments of one item ordered by start time.
    fn assignments_for(&self, id: &WorkItemId) -> Vec<Assignment>;

    /// Block intervals of one item ordered by block time.
    fn blocks_for(&self, id: &WorkItemId) -> Vec<BlockInterval>;

    /// Pipeline stages in pipeline order.
    fn stages(&self) -> Vec<Stage>;

    fn stage(&self, id: &StageId) -> Option<Stage> {
        self.stages().into_iter().find(|stage| &stage.id == id)
    }

    /// Effort settings for a (container, stage) pair; unconfigured pairs
    /// yield the all-zero default.
    fn stage_config(&self, container_id: &str, stage_id: &StageId) -> StageEffortConfig;

    /// Holidays and team days off.
    fn non_working_calendar(&self) -> NonWorkingCalendar {
        NonWorkingCalendar::default()
    }
}

/// Write side for attribution output. Records are replaced wholesale.
pub trait EffortSink {
    fn replace_effort_records(
        &self,
        id: &WorkItemId,
        records: Vec<EffortRecord>,
    ) -> Result<(), RepoError>;

    fn store_effort_totals(&self, id: &WorkItemId, totals: EffortTotals) -> Result<(), RepoError>;

    fn effort_records_for(&self, id: &WorkItemId) -> Vec<EffortRecord>;
}
