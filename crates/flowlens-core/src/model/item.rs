use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{EffortTotals, ParseEnumError, normalize};

/// Identifier of a work item ("demand").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(String);

impl WorkItemId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Work item classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Feature,
    Bug,
    Chore,
    Spike,
}

impl Kind {
    pub const ALL: [Self; 4] = [Self::Feature, Self::Bug, Self::Chore, Self::Spike];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Chore => "chore",
            Self::Spike => "spike",
        }
    }
}

impl Default for Kind {
    fn default() -> Self {
        Self::Feature
    }
}

/// Class of service, driving the urgency policy of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassOfService {
    Standard,
    Expedite,
    FixedDate,
    Intangible,
}

impl ClassOfService {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Expedite => "expedite",
            Self::FixedDate => "fixed_date",
            Self::Intangible => "intangible",
        }
    }
}

impl Default for ClassOfService {
    fn default() -> Self {
        Self::Standard
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ClassOfService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "feature" => Ok(Self::Feature),
            "bug" => Ok(Self::Bug),
            "chore" => Ok(Self::Chore),
            "spike" => Ok(Self::Spike),
            _ => Err(ParseEnumError {
                expected: "kind",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for ClassOfService {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "standard" => Ok(Self::Standard),
            "expedite" => Ok(Self::Expedite),
            "fixed_date" => Ok(Self::FixedDate),
            "intangible" => Ok(Self::Intangible),
            _ => Err(ParseEnumError {
                expected: "class of service",
                got: s.to_string(),
            }),
        }
    }
}

/// A trackable unit of delivery work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    /// Project (or other container) the item belongs to; stage effort
    /// settings are resolved per container.
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub kind: Kind,
    #[serde(default)]
    pub class_of_service: ClassOfService,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discarded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub effort: EffortTotals,
}

impl WorkItem {
    #[must_use]
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: WorkItemId::new(id),
            container_id: String::new(),
            kind: Kind::default(),
            class_of_service: ClassOfService::default(),
            created_at,
            committed_at: None,
            completed_at: None,
            discarded_at: None,
            effort: EffortTotals::default(),
        }
    }

    #[must_use]
    pub const fn is_bug(&self) -> bool {
        matches!(self.kind, Kind::Bug)
    }

    /// Delivered items that crossed the commitment point count as
    /// downstream deliveries.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed_at.is_some()
    }

    #[must_use]
    pub fn is_completed_by(&self, instant: DateTime<Utc>) -> bool {
        self.completed_at.is_some_and(|done| done <= instant)
    }

    #[must_use]
    pub fn is_discarded_before(&self, instant: DateTime<Utc>) -> bool {
        self.discarded_at.is_some_and(|discarded| discarded < instant)
    }
}
