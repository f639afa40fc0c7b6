#![forbid(unsafe_code)]
//! flowlens-analytics: windowed flow metrics, descriptive statistics and
//! Monte Carlo delivery forecasts.
//!
//! # Conventions
//!
//! - **Errors**: Statistics are total functions; only [`flow::FlowError`]
//!   surfaces to callers.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod flow;
pub mod forecast;
pub mod stats;

pub use flow::{ChartSeries, FlowConfig, FlowError, FlowWindowAggregator, MetricSnapshot};
pub use forecast::{BacklogGap, ForecastEngine, ForecastReport, MonteCarloForecast};
pub use stats::HistogramBin;
