//! Serializable snapshot of everything the engine reads, with boundary
//! validation.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::calendar::NonWorkingCalendar;
use crate::error::ErrorCode;
use crate::model::{
    Assignment, BlockInterval, Stage, StageEffortConfig, StageId, Transition, WorkItem, WorkItemId,
};

/// Validation and parsing failures at the data-model boundary.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} dataset: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("duplicate work item id {0}")]
    DuplicateItem(WorkItemId),

    #[error("{kind} {record_id} references unknown work item {item_id}")]
    UnknownItemReference {
        kind: &'static str,
        record_id: String,
        item_id: WorkItemId,
    },

    #[error("transition {transition_id} references unknown stage {stage_id}")]
    UnknownStage {
        transition_id: String,
        stage_id: StageId,
    },

    #[error("transitions {first} and {second} of {item_id} overlap")]
    OverlappingTransitions {
        item_id: WorkItemId,
        first: String,
        second: String,
    },

    #[error("{kind} {record_id} ends before it starts")]
    InvertedInterval {
        kind: &'static str,
        record_id: String,
    },
}

impl ModelError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } | Self::Parse { .. } => ErrorCode::DatasetParseError,
            Self::DuplicateItem(_) => ErrorCode::DuplicateItem,
            Self::UnknownItemReference { .. } => ErrorCode::UnknownItemReference,
            Self::UnknownStage { .. } => ErrorCode::StageNotFound,
            Self::OverlappingTransitions { .. } => ErrorCode::OverlappingTransitions,
            Self::InvertedInterval { .. } => ErrorCode::InvertedInterval,
        }
    }
}

/// Effort settings for one stage, optionally scoped to a container.
///
/// An empty `container_id` applies to every container that has no
/// container-specific entry for the stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfigEntry {
    #[serde(default)]
    pub container_id: String,
    pub stage_id: StageId,
    #[serde(flatten)]
    pub config: StageEffortConfig,
}

/// Everything the engine consumes, as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub stage_configs: Vec<StageConfigEntry>,
    #[serde(default)]
    pub work_items: Vec<WorkItem>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub blocks: Vec<BlockInterval>,
    #[serde(default)]
    pub calendar: NonWorkingCalendar,
}

impl Dataset {
    /// # Errors
    ///
    /// Returns [`ModelError::Parse`] for malformed JSON.
    pub fn from_json_str(content: &str) -> Result<Self, ModelError> {
        serde_json::from_str(content).map_err(|err| ModelError::Parse {
            format: "json",
            message: err.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ModelError::Parse`] for malformed TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        toml::from_str(content).map_err(|err| ModelError::Parse {
            format: "toml",
            message: err.to_string(),
        })
    }

    /// Load a dataset file; `.toml` files are parsed as TOML, everything
    /// else as JSON. The result is validated.
    ///
    /// # Errors
    ///
    /// I/O, parse and validation failures, see [`ModelError`].
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let dataset = if is_toml {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Check referential integrity and timeline shape.
    ///
    /// # Errors
    ///
    /// Returns the first duplicate id, dangling reference, unknown stage,
    /// inverted interval or overlapping transition pair found.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut item_ids = HashSet::with_capacity(self.work_items.len());
        for item in &self.work_items {
            if !item_ids.insert(&item.id) {
                return Err(ModelError::DuplicateItem(item.id.clone()));
            }
        }

        let stage_ids: HashSet<&StageId> = self.stages.iter().map(|stage| &stage.id).collect();

        for transition in &self.transitions {
            check_reference(&item_ids, "transition", &transition.id, &transition.work_item_id)?;
            if !stage_ids.contains(&transition.stage_id) {
                return Err(ModelError::UnknownStage {
                    transition_id: transition.id.clone(),
                    stage_id: transition.stage_id.clone(),
                });
            }
            check_order(
                "transition",
                &transition.id,
                transition.entered_at,
                transition.exited_at,
            )?;
        }

        for assignment in &self.assignments {
            check_reference(&item_ids, "assignment", &assignment.id, &assignment.work_item_id)?;
            check_order(
                "assignment",
                &assignment.id,
                assignment.started_at,
                assignment.finished_at,
            )?;
        }

        for block in &self.blocks {
            check_reference(&item_ids, "block", &block.id, &block.work_item_id)?;
            check_order("block", &block.id, block.blocked_at, block.unblocked_at)?;
        }

        check_no_overlapping_transitions(&self.transitions)
    }
}

fn check_reference(
    item_ids: &HashSet<&WorkItemId>,
    kind: &'static str,
    record_id: &str,
    item_id: &WorkItemId,
) -> Result<(), ModelError> {
    if item_ids.contains(item_id) {
        Ok(())
    } else {
        Err(ModelError::UnknownItemReference {
            kind,
            record_id: record_id.to_string(),
            item_id: item_id.clone(),
        })
    }
}

fn check_order(
    kind: &'static str,
    record_id: &str,
    start: chrono::DateTime<chrono::Utc>,
    end: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<(), ModelError> {
    match end {
        Some(end) if end < start => Err(ModelError::InvertedInterval {
            kind,
            record_id: record_id.to_string(),
        }),
        _ => Ok(()),
    }
}

fn check_no_overlapping_transitions(transitions: &[Transition]) -> Result<(), ModelError> {
    let mut by_item: HashMap<&WorkItemId, Vec<&Transition>> = HashMap::new();
    for transition in transitions {
        by_item
            .entry(&transition.work_item_id)
            .or_default()
            .push(transition);
    }

    for (item_id, mut list) in by_item {
        list.sort_by_key(|transition| transition.entered_at);
        for pair in list.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            let overlaps = first
                .exited_at
                .is_none_or(|exited| exited > second.entered_at);
            if overlaps {
                return Err(ModelError::OverlappingTransitions {
                    item_id: item_id.clone(),
                    first: first.id.clone(),
                    second: second.id.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "stages": [
            {"id": "todo", "name": "To Do", "order": 0, "stream": "upstream", "queue": true},
            {"id": "dev", "name": "Development", "order": 1, "stream": "downstream"}
        ],
        "stage_configs": [
            {"stage_id": "dev", "effort_bearing": true, "stage_percentage": 1.0}
        ],
        "work_items": [
            {"id": "D-1", "created_at": "2024-01-01T09:00:00Z"}
        ],
        "transitions": [
            {"id": "t1", "work_item_id": "D-1", "stage_id": "todo",
             "entered_at": "2024-01-01T09:00:00Z", "exited_at": "2024-01-02T09:00:00Z"},
            {"id": "t2", "work_item_id": "D-1", "stage_id": "dev",
             "entered_at": "2024-01-02T09:00:00Z"}
        ]
    }"#;

    #[test]
    fn sample_parses_and_validates() {
        let dataset = Dataset::from_json_str(SAMPLE).expect("parse");
        dataset.validate().expect("valid");
        assert_eq!(dataset.stages.len(), 2);
        assert!(dataset.stage_configs[0].config.effort_bearing);
        assert!(dataset.stage_configs[0].config.pairing_percentage.is_none());
    }

    #[test]
    fn overlapping_transitions_are_rejected() {
        let mut dataset = Dataset::from_json_str(SAMPLE).expect("parse");
        dataset.transitions[0].exited_at = None;
        let err = dataset.validate().expect_err("overlap");
        assert_eq!(err.code(), ErrorCode::OverlappingTransitions);
    }

    #[test]
    fn unknown_item_reference_is_rejected() {
        let mut dataset = Dataset::from_json_str(SAMPLE).expect("parse");
        dataset.transitions[1].work_item_id = WorkItemId::new("D-404");
        let err = dataset.validate().expect_err("unknown item");
        assert!(matches!(err, ModelError::UnknownItemReference { kind: "transition", .. }));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let mut dataset = Dataset::from_json_str(SAMPLE).expect("parse");
        dataset.transitions[1].stage_id = StageId::new("qa");
        let err = dataset.validate().expect_err("unknown stage");
        assert_eq!(err.code(), ErrorCode::StageNotFound);
    }

    #[test]
    fn duplicate_items_are_rejected() {
        let mut dataset = Dataset::from_json_str(SAMPLE).expect("parse");
        let copy = dataset.work_items[0].clone();
        dataset.work_items.push(copy);
        assert_eq!(
            dataset.validate().expect_err("duplicate").code(),
            ErrorCode::DuplicateItem
        );
    }

    #[test]
    fn malformed_json_reports_parse_error() {
        let err = Dataset::from_json_str("{ not json").expect_err("parse error");
        assert_eq!(err.code(), ErrorCode::DatasetParseError);
    }
}
