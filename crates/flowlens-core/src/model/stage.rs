use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, normalize};

/// Identifier of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which side of the commitment point a stage sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStream {
    Upstream,
    Downstream,
}

impl StageStream {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }
}

impl fmt::Display for StageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStream {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "upstream" => Ok(Self::Upstream),
            "downstream" => Ok(Self::Downstream),
            _ => Err(ParseEnumError {
                expected: "stage stream",
                got: s.to_string(),
            }),
        }
    }
}

/// A pipeline stage definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    /// Position in the pipeline, lower comes first.
    pub order: i32,
    pub stream: StageStream,
    /// Wait stage (items sit idle); counted as queue time for flow efficiency.
    #[serde(default)]
    pub queue: bool,
    /// Reaching this stage means the item is delivered.
    #[serde(default)]
    pub end_point: bool,
}

/// Per-(container, stage) effort settings.
///
/// Percentages are fractions in `[0, 1]`. Missing values mean 0%; out of
/// range values are clamped when read through the accessor methods.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageEffortConfig {
    /// Whether work done while an item sits in this stage counts as effort.
    #[serde(default)]
    pub effort_bearing: bool,
    #[serde(default)]
    pub stage_percentage: Option<f64>,
    #[serde(default)]
    pub management_percentage: Option<f64>,
    #[serde(default)]
    pub pairing_percentage: Option<f64>,
}

impl StageEffortConfig {
    /// Fully counted effort stage: 100% stage, pairing and management share.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            effort_bearing: true,
            stage_percentage: Some(1.0),
            management_percentage: Some(1.0),
            pairing_percentage: Some(1.0),
        }
    }

    #[must_use]
    pub fn stage_fraction(&self) -> f64 {
        fraction(self.stage_percentage)
    }

    #[must_use]
    pub fn management_fraction(&self) -> f64 {
        fraction(self.management_percentage)
    }

    #[must_use]
    pub fn pairing_fraction(&self) -> f64 {
        fraction(self.pairing_percentage)
    }
}

fn fraction(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}
