//! `fl hours`: business hours between two instants.

use crate::output::{OutputMode, hours, pretty_kv, pretty_section, render_mode};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use flowlens_core::Calendar;

#[derive(Args, Debug)]
pub struct HoursArgs {
    /// Interval start (RFC 3339, e.g. 2024-01-01T09:00:00Z).
    pub start: DateTime<Utc>,

    /// Interval end (RFC 3339).
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HoursReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub hours_per_day: f64,
    pub business_hours: f64,
}

pub fn measure(args: &HoursArgs, calendar: &Calendar) -> HoursReport {
    HoursReport {
        start: args.start,
        end: args.end,
        hours_per_day: calendar.hours_per_day(),
        business_hours: calendar.business_hours_between(args.start, args.end),
    }
}

pub fn run_hours(args: &HoursArgs, calendar: &Calendar, output: OutputMode) -> anyhow::Result<()> {
    let report = measure(args, calendar);
    render_mode(
        output,
        &report,
        |report, w| writeln!(w, "{}", hours(report.business_hours)),
        |report, w| {
            pretty_section(w, "Business hours")?;
            pretty_kv(w, "start", report.start.to_rfc3339())?;
            pretty_kv(w, "end", report.end.to_rfc3339())?;
            pretty_kv(w, "hours/day", hours(report.hours_per_day))?;
            pretty_kv(w, "hours", hours(report.business_hours))
        },
    )
}
