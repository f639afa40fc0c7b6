//! The three independent timelines of a work item: stage occupancy,
//! member assignment and blocking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, StageId, WorkItemId, normalize};
use crate::interval::Interval;

/// Role a team member plays on the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Developer,
    Designer,
    Manager,
    Client,
}

impl MemberRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::Designer => "designer",
            Self::Manager => "manager",
            Self::Client => "client",
        }
    }
}

impl Default for MemberRole {
    fn default() -> Self {
        Self::Developer
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "developer" => Ok(Self::Developer),
            "designer" => Ok(Self::Designer),
            "manager" => Ok(Self::Manager),
            "client" => Ok(Self::Client),
            _ => Err(ParseEnumError {
                expected: "member role",
                got: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: MemberRole,
}

/// Interval during which a work item occupies one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub work_item_id: WorkItemId,
    pub stage_id: StageId,
    pub entered_at: DateTime<Utc>,
    /// `None` while the item is still in the stage.
    #[serde(default)]
    pub exited_at: Option<DateTime<Utc>>,
}

impl Transition {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.exited_at.is_none()
    }

    #[must_use]
    pub fn interval(&self, now: DateTime<Utc>) -> Option<Interval> {
        Interval::open_ended(self.entered_at, self.exited_at, now)
    }
}

/// A member working on an item. Several may overlap (pairing, mobbing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub work_item_id: WorkItemId,
    pub member: TeamMember,
    pub started_at: DateTime<Utc>,
    /// `None` while the member is still assigned.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Assignment {
    #[must_use]
    pub fn interval(&self, now: DateTime<Utc>) -> Option<Interval> {
        Interval::open_ended(self.started_at, self.finished_at, now)
    }
}

/// Suspended work. An open block lasts through "now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInterval {
    pub id: String,
    pub work_item_id: WorkItemId,
    pub blocked_at: DateTime<Utc>,
    #[serde(default)]
    pub unblocked_at: Option<DateTime<Utc>>,
}

impl BlockInterval {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.unblocked_at.is_none()
    }

    #[must_use]
    pub fn interval(&self, now: DateTime<Utc>) -> Option<Interval> {
        Interval::open_ended(self.blocked_at, self.unblocked_at, now)
    }
}
