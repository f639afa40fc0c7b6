//! `fl flow`: per-window flow metrics and chart series.

use crate::output::{OutputMode, hours, pretty_kv, pretty_section, render_mode};
use chrono::{NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use flowlens_analytics::{ChartSeries, FlowConfig, FlowWindowAggregator, MetricSnapshot};
use flowlens_core::config::ProjectConfig;
use flowlens_core::repo::InMemoryRepository;
use flowlens_core::{Period, windows_between};

use super::{load_repository, observed_range};

/// Dataset and window range shared by `flow` and `forecast`.
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Dataset file (JSON or TOML).
    #[arg(short, long, default_value = "flowlens.json")]
    pub dataset: PathBuf,

    /// Window size: day, week or month. Defaults to the configured period.
    #[arg(short, long)]
    pub period: Option<Period>,

    /// First day to cover. Defaults to the earliest item creation.
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day to cover. Defaults to the latest recorded event.
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct FlowArgs {
    #[command(flatten)]
    pub range: RangeArgs,
}

#[derive(Debug, Serialize)]
pub struct FlowReport {
    pub period: Period,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub snapshots: Vec<MetricSnapshot>,
    pub chart: ChartSeries,
}

/// Accumulate every window of the requested range.
pub fn compute_flow(
    repo: &InMemoryRepository,
    range: &RangeArgs,
    config: &ProjectConfig,
) -> anyhow::Result<FlowReport> {
    let period = range.period.unwrap_or(config.flow.period);
    let observed = observed_range(repo);
    let from = range.from.or_else(|| observed.map(|(first, _)| first));
    let to = range
        .to
        .or_else(|| observed.map(|(_, last)| last))
        .unwrap_or_else(|| Utc::now().date_naive());

    let windows = from.map_or_else(Vec::new, |from| windows_between(from, to, period));
    let flow_config = FlowConfig::from(&config.flow).with_calendar(config.calendar.calendar());

    let (snapshots, chart) = match windows.last() {
        Some(last) => {
            let mut aggregator = FlowWindowAggregator::from_repository(repo, last.end, flow_config);
            let snapshots = aggregator.accumulate_all(&windows)?;
            (snapshots, aggregator.chart().clone())
        }
        None => (Vec::new(), ChartSeries::default()),
    };

    Ok(FlowReport {
        period,
        from,
        to: from.map(|_| to),
        snapshots,
        chart,
    })
}

pub fn run_flow(args: &FlowArgs, config: &ProjectConfig, output: OutputMode) -> anyhow::Result<()> {
    let repo = load_repository(&args.range.dataset)?;
    let report = compute_flow(&repo, &args.range, config)?;
    render_mode(output, &report, render_text, render_pretty)
}

fn render_text(report: &FlowReport, w: &mut dyn Write) -> io::Result<()> {
    for snapshot in &report.snapshots {
        writeln!(
            w,
            "{}  scope={} throughput={} accumulated={} bugs={:.1}% lead_p80={} efficiency={:.1}%",
            snapshot.label,
            snapshot.scope,
            snapshot.throughput,
            snapshot.accumulated_throughput,
            snapshot.bugs_share,
            hours(snapshot.lead_time_p80),
            snapshot.flow_efficiency
        )?;
    }
    Ok(())
}

fn render_pretty(report: &FlowReport, w: &mut dyn Write) -> io::Result<()> {
    if report.snapshots.is_empty() {
        return writeln!(w, "No windows to report.");
    }
    for snapshot in &report.snapshots {
        pretty_section(w, &format!("{} ({})", snapshot.label, report.period))?;
        pretty_kv(w, "scope", snapshot.scope.to_string())?;
        pretty_kv(
            w,
            "throughput",
            format!(
                "{} (total {})",
                snapshot.throughput, snapshot.accumulated_throughput
            ),
        )?;
        let by_kind = snapshot
            .throughput_by_kind
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        if !by_kind.is_empty() {
            pretty_kv(w, "by kind", by_kind)?;
        }
        pretty_kv(
            w,
            "bugs",
            format!(
                "+{} -{} ({:.1}% of items)",
                snapshot.bugs_opened, snapshot.bugs_closed, snapshot.bugs_share
            ),
        )?;
        pretty_kv(
            w,
            "delivered",
            format!(
                "upstream {} downstream {}",
                snapshot.upstream_delivered, snapshot.downstream_delivered
            ),
        )?;
        pretty_kv(
            w,
            "lead p80",
            format!(
                "{}h (to date {}h)",
                hours(snapshot.lead_time_p80),
                hours(snapshot.lead_time_p80_to_date)
            ),
        )?;
        pretty_kv(w, "efficiency", format!("{:.1}%", snapshot.flow_efficiency))?;
        let cfd = snapshot
            .cfd
            .iter()
            .map(|stage| format!("{}={}", stage.name, stage.count))
            .collect::<Vec<_>>()
            .join(" ");
        pretty_kv(w, "cfd", cfd)?;
        writeln!(w)?;
    }
    Ok(())
}
