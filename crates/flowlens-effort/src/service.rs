//! Repository-backed rebuild of an item's effort records.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use flowlens_core::ErrorCode;
use flowlens_core::lock::{LockError, RebuildLocks};
use flowlens_core::model::{EffortRecord, EffortTotals, WorkItemId};
use flowlens_core::repo::{EffortSink, FlowRepository, RepoError};

use crate::engine::{EffortAttributionEngine, StageSettings, WorkItemHistory};

#[derive(Debug, thiserror::Error)]
pub enum EffortError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl EffortError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Repo(err) => err.code(),
            Self::Lock(err) => err.code(),
        }
    }
}

/// Outcome of one item rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct EffortRebuild {
    pub work_item_id: WorkItemId,
    pub records: Vec<EffortRecord>,
    pub totals: EffortTotals,
}

/// Rebuilds effort records through a repository, one item at a time.
///
/// Each rebuild throws away the item's previous records and writes the
/// freshly computed set, so running it twice leaves the same state.
pub struct EffortService<'a, R> {
    repo: &'a R,
    engine: EffortAttributionEngine,
    locks: &'a RebuildLocks,
}

impl<'a, R> EffortService<'a, R>
where
    R: FlowRepository + EffortSink,
{
    /// The engine picks up the repository's non-working calendar.
    #[must_use]
    pub fn new(repo: &'a R, engine: EffortAttributionEngine, locks: &'a RebuildLocks) -> Self {
        let engine = engine.with_non_working(repo.non_working_calendar());
        Self {
            repo,
            engine,
            locks,
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &EffortAttributionEngine {
        &self.engine
    }

    /// Recompute and persist records and totals for one item.
    ///
    /// # Errors
    ///
    /// Lock timeouts, unknown items and repository write failures.
    #[instrument(skip(self), fields(item = %id))]
    pub fn rebuild(&self, id: &WorkItemId, now: DateTime<Utc>) -> Result<EffortRebuild, EffortError> {
        let _guard = self.locks.acquire(id)?;

        let history = WorkItemHistory::load(self.repo, id)?;
        let settings = StageSettings::load(self.repo, &history.item.container_id);
        let records = self.engine.build_efforts_for(&history, &settings, now);
        let totals = EffortTotals::from_records(&records);

        self.repo.replace_effort_records(id, records.clone())?;
        self.repo.store_effort_totals(id, totals)?;

        info!(records = records.len(), total = totals.total(), "effort rebuilt");
        Ok(EffortRebuild {
            work_item_id: id.clone(),
            records,
            totals,
        })
    }

    /// Rebuild every listed item, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// The first error returned by [`Self::rebuild`].
    pub fn rebuild_all<'i>(
        &self,
        ids: impl IntoIterator<Item = &'i WorkItemId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<EffortRebuild>, EffortError> {
        ids.into_iter().map(|id| self.rebuild(id, now)).collect()
    }
}
