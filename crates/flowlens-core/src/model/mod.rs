//! Domain types shared by the attribution, flow and forecast engines.

pub mod effort;
pub mod item;
pub mod stage;
pub mod timeline;

use std::fmt;

pub use effort::{EffortRecord, EffortTotals};
pub use item::{ClassOfService, Kind, WorkItem, WorkItemId};
pub use stage::{Stage, StageEffortConfig, StageId, StageStream};
pub use timeline::{Assignment, BlockInterval, MemberRole, TeamMember, Transition};

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

pub(crate) fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace('-', "_")
}
