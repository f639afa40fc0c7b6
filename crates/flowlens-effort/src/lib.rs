#![forbid(unsafe_code)]
//! flowlens-effort: turns stage occupancy, assignments and block intervals
//! into per-member effort records and per-item effort totals.
//!
//! # Conventions
//!
//! - **Errors**: [`EffortError`] wraps repository and lock failures; every
//!   variant maps to a [`flowlens_core::ErrorCode`].
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod engine;
pub mod segments;
pub mod service;

pub use engine::{EffortAttributionEngine, StageSettings, WorkItemHistory};
pub use service::{EffortError, EffortRebuild, EffortService};
