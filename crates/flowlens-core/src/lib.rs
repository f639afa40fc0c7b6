#![forbid(unsafe_code)]
//! flowlens-core: data model, business calendar, periods, configuration and
//! repository contracts shared by the flowlens engines.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums at the data boundary, each mapped to an
//!   [`error::ErrorCode`]; `anyhow::Result` for config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod calendar;
pub mod config;
pub mod error;
pub mod interval;
pub mod lock;
pub mod model;
pub mod period;
pub mod repo;

pub use calendar::{Calendar, DayOffRange, NonWorkingCalendar};
pub use error::ErrorCode;
pub use interval::Interval;
pub use period::{Period, Window, windows_between};
