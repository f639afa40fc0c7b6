use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{Dataset, EffortSink, FlowRepository, RepoError, StageConfigEntry};
use crate::calendar::NonWorkingCalendar;
use crate::model::{
    Assignment, BlockInterval, EffortRecord, EffortTotals, Stage, StageEffortConfig, StageId,
    Transition, WorkItem, WorkItemId,
};

/// Repository backed by an in-memory [`Dataset`].
///
/// Timelines are grouped per item and pre-sorted at construction. Effort
/// output lives behind `RwLock`s so rebuilds for different items can run
/// from several threads.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    items: RwLock<BTreeMap<WorkItemId, WorkItem>>,
    stages: Vec<Stage>,
    stage_configs: Vec<StageConfigEntry>,
    transitions: HashMap<WorkItemId, Vec<Transition>>,
    assignments: HashMap<WorkItemId, Vec<Assignment>>,
    blocks: HashMap<WorkItemId, Vec<BlockInterval>>,
    calendar: NonWorkingCalendar,
    efforts: RwLock<HashMap<WorkItemId, Vec<EffortRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn from_dataset(dataset: Dataset) -> Self {
        let Dataset {
            mut stages,
            stage_configs,
            work_items,
            transitions,
            assignments,
            blocks,
            calendar,
        } = dataset;

        stages.sort_by_key(|stage| stage.order);

        let items = work_items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let mut transitions = group_by_item(transitions, |t| &t.work_item_id);
        for list in transitions.values_mut() {
            list.sort_by_key(|t| t.entered_at);
        }
        let mut assignments = group_by_item(assignments, |a| &a.work_item_id);
        for list in assignments.values_mut() {
            list.sort_by_key(|a| a.started_at);
        }
        let mut blocks = group_by_item(blocks, |b| &b.work_item_id);
        for list in blocks.values_mut() {
            list.sort_by_key(|b| b.blocked_at);
        }

        Self {
            items: RwLock::new(items),
            stages,
            stage_configs,
            transitions,
            assignments,
            blocks,
            calendar,
            efforts: RwLock::new(HashMap::new()),
        }
    }

    /// Work item ids in id order.
    ///
    /// # Errors
    ///
    /// [`RepoError::Poisoned`] if a writer panicked.
    pub fn item_ids(&self) -> Result<Vec<WorkItemId>, RepoError> {
        let items = self.items.read().map_err(|_| RepoError::Poisoned)?;
        Ok(items.keys().cloned().collect())
    }
}

fn group_by_item<T>(
    records: Vec<T>,
    key: impl Fn(&T) -> &WorkItemId,
) -> HashMap<WorkItemId, Vec<T>> {
    let mut grouped: HashMap<WorkItemId, Vec<T>> = HashMap::new();
    for record in records {
        grouped.entry(key(&record).clone()).or_default().push(record);
    }
    grouped
}

fn sorted_by_creation(mut items: Vec<WorkItem>) -> Vec<WorkItem> {
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    items
}

impl FlowRepository for InMemoryRepository {
    fn work_item(&self, id: &WorkItemId) -> Result<WorkItem, RepoError> {
        let items = self.items.read().map_err(|_| RepoError::Poisoned)?;
        items
            .get(id)
            .cloned()
            .ok_or_else(|| RepoError::ItemNotFound(id.clone()))
    }

    fn work_items(&self) -> Vec<WorkItem> {
        self.items
            .read()
            .map(|items| sorted_by_creation(items.values().cloned().collect()))
            .unwrap_or_default()
    }

    fn work_items_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<WorkItem> {
        let items = self
            .work_items()
            .into_iter()
            .filter(|item| item.created_at <= to)
            .filter(|item| item.completed_at.is_none_or(|done| done >= from))
            .filter(|item| !item.is_discarded_before(from))
            .collect();
        sorted_by_creation(items)
    }

    fn transitions_for(&self, id: &WorkItemId) -> Vec<Transition> {
        self.transitions.get(id).cloned().unwrap_or_default()
    }

    fn assignments_for(&self, id: &WorkItemId) -> Vec<Assignment> {
        self.assignments.get(id).cloned().unwrap_or_default()
    }

    fn blocks_for(&self, id: &WorkItemId) -> Vec<BlockInterval> {
        self.blocks.get(id).cloned().unwrap_or_default()
    }

    fn stages(&self) -> Vec<Stage> {
        self.stages.clone()
    }

    fn stage_config(&self, container_id: &str, stage_id: &StageId) -> StageEffortConfig {
        let for_stage = || {
            self.stage_configs
                .iter()
                .filter(move |entry| &entry.stage_id == stage_id)
        };
        for_stage()
            .find(|entry| entry.container_id == container_id)
            .or_else(|| for_stage().find(|entry| entry.container_id.is_empty()))
            .map(|entry| entry.config)
            .unwrap_or_default()
    }

    fn non_working_calendar(&self) -> NonWorkingCalendar {
        self.calendar.clone()
    }
}

impl EffortSink for InMemoryRepository {
    fn replace_effort_records(
        &self,
        id: &WorkItemId,
        records: Vec<EffortRecord>,
    ) -> Result<(), RepoError> {
        let mut efforts = self.efforts.write().map_err(|_| RepoError::Poisoned)?;
        efforts.remove(id);
        efforts.insert(id.clone(), records);
        Ok(())
    }

    fn store_effort_totals(&self, id: &WorkItemId, totals: EffortTotals) -> Result<(), RepoError> {
        let mut items = self.items.write().map_err(|_| RepoError::Poisoned)?;
        let item = items
            .get_mut(id)
            .ok_or_else(|| RepoError::ItemNotFound(id.clone()))?;
        item.effort = totals;
        Ok(())
    }

    fn effort_records_for(&self, id: &WorkItemId) -> Vec<EffortRecord> {
        self.efforts
            .read()
            .ok()
            .and_then(|efforts| efforts.get(id).cloned())
            .unwrap_or_default()
    }
}
