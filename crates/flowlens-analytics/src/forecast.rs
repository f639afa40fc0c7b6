//! Delivery forecasts derived from flow snapshots.

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, instrument};

use flowlens_core::config::ForecastSettings;

use crate::flow::MetricSnapshot;
use crate::stats::{self, HistogramBin};

const DAYS_PER_WEEK: i64 = 7;

/// Distribution of simulated completion weeks with its summary figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloForecast {
    pub distribution: Vec<u32>,
    pub p50: f64,
    pub p80: f64,
    pub p95: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub histogram: Vec<HistogramBin>,
}

impl MonteCarloForecast {
    #[must_use]
    pub fn from_distribution(distribution: Vec<u32>) -> Self {
        let values: Vec<f64> = distribution.iter().copied().map(f64::from).collect();
        Self {
            p50: stats::percentile(50.0, &values),
            p80: stats::percentile(80.0, &values),
            p95: stats::percentile(95.0, &values),
            mean: stats::mean(&values),
            std_dev: stats::standard_deviation(&values),
            histogram: stats::histogram(&values),
            distribution,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.distribution.is_empty()
    }

    /// Share of outcomes finishing within `weeks`.
    #[must_use]
    pub fn odds_within(&self, weeks: u32) -> f64 {
        stats::odds_to_deadline(weeks, &self.distribution)
    }

    /// Odds of finishing by `deadline`, counting whole weeks from `today`.
    #[must_use]
    pub fn odds_to_deadline(&self, deadline: NaiveDate, today: NaiveDate) -> f64 {
        self.odds_within(weeks_until(deadline, today))
    }
}

/// Weeks from `today` to `deadline`, rounded up; zero once it has passed.
#[must_use]
pub fn weeks_until(deadline: NaiveDate, today: NaiveDate) -> u32 {
    let days = (deadline - today).num_days();
    if days <= 0 {
        return 0;
    }
    let weeks = (days + DAYS_PER_WEEK - 1) / DAYS_PER_WEEK;
    u32::try_from(weeks).unwrap_or(u32::MAX)
}

/// Remaining work against what is known today.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BacklogGap {
    pub known_scope: usize,
    pub delivered: usize,
    /// Negative when more was delivered than was ever scoped.
    pub remaining: i64,
    /// Scope added since the first snapshot.
    pub scope_growth: i64,
    /// `scope_growth` relative to the initial scope, as a percentage.
    pub scope_growth_pct: f64,
}

impl BacklogGap {
    #[must_use]
    pub fn from_snapshots(snapshots: &[MetricSnapshot]) -> Option<Self> {
        let first = snapshots.first()?;
        let last = snapshots.last()?;
        let initial_scope = signed(first.scope);
        let known_scope = signed(last.scope);
        let scope_growth = known_scope - initial_scope;

        #[allow(clippy::cast_precision_loss)]
        let scope_growth_pct = if initial_scope > 0 {
            scope_growth as f64 / initial_scope as f64 * 100.0
        } else {
            0.0
        };

        Some(Self {
            known_scope: last.scope,
            delivered: last.accumulated_throughput,
            remaining: known_scope - signed(last.accumulated_throughput),
            scope_growth,
            scope_growth_pct,
        })
    }

    /// Items still to deliver, never negative.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        usize::try_from(self.remaining).unwrap_or(0)
    }
}

fn signed(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Everything a dashboard needs about delivery expectations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub backlog: BacklogGap,
    pub forecast: MonteCarloForecast,
    pub deadline: Option<NaiveDate>,
    pub weeks_to_deadline: Option<u32>,
    pub deadline_odds: Option<f64>,
}

/// Monte Carlo forecasting over throughput samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastEngine {
    iterations: usize,
    seed: Option<u64>,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::from(&ForecastSettings::default())
    }
}

impl From<&ForecastSettings> for ForecastEngine {
    fn from(settings: &ForecastSettings) -> Self {
        Self {
            iterations: settings.iterations,
            seed: settings.seed,
        }
    }
}

impl ForecastEngine {
    #[must_use]
    pub const fn new(iterations: usize) -> Self {
        Self {
            iterations,
            seed: None,
        }
    }

    /// Fix the generator seed for reproducible runs.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Simulate delivering `remaining_scope` items from `samples`.
    #[must_use]
    pub fn simulate(&self, remaining_scope: usize, samples: &[f64]) -> MonteCarloForecast {
        let mut rng = self
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        #[allow(clippy::cast_precision_loss)]
        let scope = remaining_scope as f64;
        let distribution = stats::monte_carlo_weeks(scope, samples, self.iterations, &mut rng);
        MonteCarloForecast::from_distribution(distribution)
    }

    /// Backlog gap, forecast and deadline odds as of the last snapshot.
    ///
    /// Returns `None` when there are no snapshots.
    #[instrument(skip(self, snapshots), fields(windows = snapshots.len()))]
    pub fn report(
        &self,
        snapshots: &[MetricSnapshot],
        deadline: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Option<ForecastReport> {
        let backlog = BacklogGap::from_snapshots(snapshots)?;
        let samples = snapshots
            .last()
            .map(|snapshot| snapshot.monte_carlo_samples.as_slice())
            .unwrap_or_default();
        let forecast = self.simulate(backlog.outstanding(), samples);
        let weeks_to_deadline = deadline.map(|deadline| weeks_until(deadline, today));
        let deadline_odds = weeks_to_deadline.map(|weeks| forecast.odds_within(weeks));

        debug!(
            remaining = backlog.remaining,
            outcomes = forecast.distribution.len(),
            p80 = forecast.p80,
            "forecast computed"
        );
        Some(ForecastReport {
            backlog,
            forecast,
            deadline,
            weeks_to_deadline,
            deadline_odds,
        })
    }
}
