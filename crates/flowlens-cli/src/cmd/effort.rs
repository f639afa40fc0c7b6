//! `fl effort`: rebuild effort attribution for one or every work item.

use crate::output::{OutputMode, hours, pretty_kv, pretty_rule, pretty_section, render_mode};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use flowlens_core::config::ProjectConfig;
use flowlens_core::lock::RebuildLocks;
use flowlens_core::model::{EffortRecord, EffortTotals, WorkItemId};
use flowlens_effort::{EffortAttributionEngine, EffortRebuild, EffortService};

use super::{load_repository, now_or};

#[derive(Args, Debug)]
pub struct EffortArgs {
    /// Dataset file (JSON or TOML).
    #[arg(short, long, default_value = "flowlens.json")]
    pub dataset: PathBuf,

    /// Rebuild only this work item.
    #[arg(long)]
    pub item: Option<String>,

    /// Evaluate open intervals as of this instant instead of now.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ItemEffort {
    pub work_item_id: WorkItemId,
    pub totals: EffortTotals,
    pub records: Vec<EffortRecord>,
}

impl From<EffortRebuild> for ItemEffort {
    fn from(rebuild: EffortRebuild) -> Self {
        Self {
            work_item_id: rebuild.work_item_id,
            totals: rebuild.totals,
            records: rebuild.records,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EffortReport {
    pub now: DateTime<Utc>,
    pub totals: EffortTotals,
    pub items: Vec<ItemEffort>,
}

pub fn run_effort(
    args: &EffortArgs,
    config: &ProjectConfig,
    output: OutputMode,
) -> anyhow::Result<()> {
    let repo = load_repository(&args.dataset)?;
    let now = now_or(args.now);
    let locks = RebuildLocks::new(config.effort.lock_timeout());
    let engine = EffortAttributionEngine::new(config.calendar.calendar());
    let service = EffortService::new(&repo, engine, &locks);

    let ids = match &args.item {
        Some(id) => vec![WorkItemId::new(id.as_str())],
        None => repo.item_ids()?,
    };
    let rebuilds = service.rebuild_all(&ids, now)?;

    let all_records: Vec<EffortRecord> = rebuilds
        .iter()
        .flat_map(|rebuild| rebuild.records.iter().cloned())
        .collect();
    let report = EffortReport {
        now,
        totals: EffortTotals::from_records(&all_records),
        items: rebuilds.into_iter().map(ItemEffort::from).collect(),
    };

    render_mode(output, &report, render_text, render_pretty)
}

fn render_text(report: &EffortReport, w: &mut dyn Write) -> io::Result<()> {
    for item in &report.items {
        for record in &item.records {
            writeln!(
                w,
                "{}  {}  {}  {}  {}",
                item.work_item_id,
                record.transition_id,
                record.member_id,
                record.stage_stream,
                hours(record.net_effort_value)
            )?;
        }
    }
    writeln!(w, "total  {}", hours(report.totals.total()))
}

fn render_pretty(report: &EffortReport, w: &mut dyn Write) -> io::Result<()> {
    for item in &report.items {
        pretty_section(w, &format!("{} effort", item.work_item_id))?;
        if item.records.is_empty() {
            writeln!(w, "(no effort recorded)")?;
        }
        for record in &item.records {
            writeln!(
                w,
                "{:<12} {:<12} {:<10} raw {:>7}  blocked {:>7}  net {:>7}",
                record.transition_id,
                record.member_id,
                record.stage_stream,
                hours(record.raw_hours),
                hours(record.blocked_hours),
                hours(record.net_effort_value)
            )?;
        }
        pretty_totals(w, &item.totals)?;
        writeln!(w)?;
    }
    pretty_section(w, "All items")?;
    pretty_totals(w, &report.totals)?;
    pretty_rule(w)
}

fn pretty_totals(w: &mut dyn Write, totals: &EffortTotals) -> io::Result<()> {
    pretty_kv(w, "upstream", hours(totals.upstream))?;
    pretty_kv(w, "downstream", hours(totals.downstream))?;
    pretty_kv(w, "development", hours(totals.development))?;
    pretty_kv(w, "design", hours(totals.design))?;
    pretty_kv(w, "management", hours(totals.management))
}
