use std::fmt;

/// Machine-readable error codes surfaced by the engine and the `fl` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    DatasetParseError,
    ItemNotFound,
    StageNotFound,
    UnknownItemReference,
    OverlappingTransitions,
    InvertedInterval,
    DuplicateItem,
    WindowOutOfOrder,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::DatasetParseError => "E1002",
            Self::ItemNotFound => "E2001",
            Self::StageNotFound => "E2002",
            Self::UnknownItemReference => "E2003",
            Self::OverlappingTransitions => "E2004",
            Self::InvertedInterval => "E2005",
            Self::DuplicateItem => "E2006",
            Self::WindowOutOfOrder => "E3001",
            Self::LockContention => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::DatasetParseError => "Dataset parse error",
            Self::ItemNotFound => "Work item not found",
            Self::StageNotFound => "Stage not found",
            Self::UnknownItemReference => "Record references an unknown work item",
            Self::OverlappingTransitions => "Overlapping stage transitions",
            Self::InvertedInterval => "Interval ends before it starts",
            Self::DuplicateItem => "Duplicate work item id",
            Self::WindowOutOfOrder => "Flow window out of order",
            Self::LockContention => "Rebuild lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .flowlens/config.toml and retry."),
            Self::DatasetParseError => Some("Check the dataset file is valid JSON or TOML."),
            Self::ItemNotFound | Self::StageNotFound => None,
            Self::UnknownItemReference => {
                Some("Every transition, assignment and block must name a known work item.")
            }
            Self::OverlappingTransitions => {
                Some("A work item occupies one stage at a time; close the previous transition first.")
            }
            Self::InvertedInterval => Some("Swap or correct the interval bounds."),
            Self::DuplicateItem => Some("Work item ids must be unique within a dataset."),
            Self::WindowOutOfOrder => {
                Some("Feed windows in increasing order from the start of the range.")
            }
            Self::LockContention => Some("Retry after the running rebuild for this item finishes."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
