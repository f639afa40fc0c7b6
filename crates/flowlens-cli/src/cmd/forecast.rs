//! `fl forecast`: backlog gap and Monte Carlo delivery forecast.

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use chrono::{NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};

use flowlens_analytics::{ForecastEngine, ForecastReport};
use flowlens_core::config::ProjectConfig;

use super::flow::{RangeArgs, compute_flow};
use super::load_repository;

#[derive(Args, Debug)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Target date; adds the odds of finishing by then.
    #[arg(long)]
    pub deadline: Option<NaiveDate>,

    /// Simulation runs. Defaults to the configured iteration count.
    #[arg(short = 'n', long)]
    pub iterations: Option<usize>,

    /// Fix the random seed for reproducible output.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Count deadline weeks from this day instead of today.
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ForecastOutput {
    pub as_of: Option<String>,
    pub today: NaiveDate,
    pub iterations: usize,
    #[serde(flatten)]
    pub report: Option<ForecastReport>,
}

pub fn build_engine(args: &ForecastArgs, config: &ProjectConfig) -> ForecastEngine {
    let mut engine = ForecastEngine::from(&config.forecast);
    if let Some(iterations) = args.iterations {
        engine = ForecastEngine::new(iterations);
        if let Some(seed) = config.forecast.seed {
            engine = engine.with_seed(seed);
        }
    }
    if let Some(seed) = args.seed {
        engine = engine.with_seed(seed);
    }
    engine
}

pub fn run_forecast(
    args: &ForecastArgs,
    config: &ProjectConfig,
    output: OutputMode,
) -> anyhow::Result<()> {
    let repo = load_repository(&args.range.dataset)?;
    let flow = compute_flow(&repo, &args.range, config)?;
    let engine = build_engine(args, config);
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());

    let forecast = ForecastOutput {
        as_of: flow.snapshots.last().map(|snapshot| snapshot.label.clone()),
        today,
        iterations: engine.iterations(),
        report: engine.report(&flow.snapshots, args.deadline, today),
    };
    render_mode(output, &forecast, render_text, render_pretty)
}

fn render_text(output: &ForecastOutput, w: &mut dyn Write) -> io::Result<()> {
    let Some(report) = &output.report else {
        return writeln!(w, "no data");
    };
    let forecast = &report.forecast;
    write!(
        w,
        "remaining={} p50={:.0} p80={:.0} p95={:.0}",
        report.backlog.remaining, forecast.p50, forecast.p80, forecast.p95
    )?;
    if let (Some(deadline), Some(odds)) = (report.deadline, report.deadline_odds) {
        write!(w, " deadline={deadline} odds={:.0}%", odds * 100.0)?;
    }
    writeln!(w)
}

fn render_pretty(output: &ForecastOutput, w: &mut dyn Write) -> io::Result<()> {
    let Some(report) = &output.report else {
        return writeln!(w, "No flow history to forecast from.");
    };
    let backlog = &report.backlog;
    let forecast = &report.forecast;

    pretty_section(w, "Backlog")?;
    if let Some(label) = &output.as_of {
        pretty_kv(w, "as of", label)?;
    }
    pretty_kv(w, "known scope", backlog.known_scope.to_string())?;
    pretty_kv(w, "delivered", backlog.delivered.to_string())?;
    pretty_kv(w, "remaining", backlog.remaining.to_string())?;
    pretty_kv(
        w,
        "scope growth",
        format!("{:+} ({:+.1}%)", backlog.scope_growth, backlog.scope_growth_pct),
    )?;
    writeln!(w)?;

    pretty_section(w, "Forecast (weeks)")?;
    if forecast.is_empty() {
        writeln!(w, "No throughput history; nothing to simulate.")?;
        return Ok(());
    }
    pretty_kv(w, "runs", output.iterations.to_string())?;
    pretty_kv(
        w,
        "p50/p80/p95",
        format!("{:.0} / {:.0} / {:.0}", forecast.p50, forecast.p80, forecast.p95),
    )?;
    pretty_kv(
        w,
        "mean",
        format!("{:.1} (sd {:.1})", forecast.mean, forecast.std_dev),
    )?;
    if let (Some(deadline), Some(weeks), Some(odds)) = (
        report.deadline,
        report.weeks_to_deadline,
        report.deadline_odds,
    ) {
        pretty_kv(
            w,
            "deadline",
            format!("{deadline} ({weeks} weeks): {:.0}% likely", odds * 100.0),
        )?;
    }
    for bin in &forecast.histogram {
        let width = bar(bin.count, output.iterations);
        writeln!(w, "  {:>4} | {}", bin.lower_bound, "#".repeat(width))?;
    }
    Ok(())
}

/// Histogram bar length scaled to 40 columns.
fn bar(count: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    (count * 40).div_ceil(total)
}
