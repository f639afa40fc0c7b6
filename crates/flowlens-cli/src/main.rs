#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::io;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use flowlens_core::ErrorCode;
use flowlens_core::config::resolve_config;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "fl: flow analytics and effort attribution",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format; overrides --json, FORMAT and the user config.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Business hours between two instants",
        long_about = "Measure business hours between two RFC 3339 instants.\n\n\
                      Spans inside one UTC day count wall-clock hours; longer spans count \
                      weekday hours scaled to the configured working day.",
        after_help = "EXAMPLES:\n    # Friday afternoon to Tuesday afternoon\n    \
                      fl hours 2018-02-09T14:00:00Z 2018-02-13T16:00:00Z\n\n    \
                      # Machine-readable output\n    \
                      fl hours 2024-01-01T09:00:00Z 2024-01-03T09:00:00Z --json"
    )]
    Hours(cmd::hours::HoursArgs),

    #[command(
        about = "Rebuild effort attribution from a dataset",
        long_about = "Recompute effort records for every work item in a dataset (or one item).\n\n\
                      Each record covers one assignment inside one stage transition, net of \
                      blocked time, pairing and stage settings.",
        after_help = "EXAMPLES:\n    # Rebuild everything\n    \
                      fl effort --dataset flowlens.json\n\n    \
                      # One item, evaluating open intervals at a fixed instant\n    \
                      fl effort --item D-42 --now 2024-03-01T12:00:00Z --json"
    )]
    Effort(cmd::effort::EffortArgs),

    #[command(
        about = "Per-window flow metrics",
        long_about = "Aggregate scope, throughput, cumulative flow, bugs, lead time and flow \
                      efficiency over day, week or month windows.",
        after_help = "EXAMPLES:\n    # Weekly windows over the whole dataset\n    \
                      fl flow --dataset flowlens.json\n\n    \
                      # Monthly windows for the first quarter\n    \
                      fl flow --period month --from 2024-01-01 --to 2024-03-31"
    )]
    Flow(cmd::flow::FlowArgs),

    #[command(
        about = "Monte Carlo delivery forecast",
        long_about = "Simulate how many weeks the remaining backlog needs, based on recent \
                      window throughput, and optionally the odds of meeting a deadline.",
        after_help = "EXAMPLES:\n    # Forecast with a deadline\n    \
                      fl forecast --deadline 2024-06-30\n\n    \
                      # Reproducible run\n    \
                      fl forecast --seed 42 --iterations 5000 --json"
    )]
    Forecast(cmd::forecast::ForecastArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FLOWLENS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "flowlens=debug,info"
        } else {
            "flowlens=info,warn"
        })
    });

    let format = env::var("FLOWLENS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

fn cli_error(err: &anyhow::Error) -> CliError {
    let message = format!("{err:#}");
    match cmd::error_code(err) {
        Some(code) => CliError::from_code(message, code),
        None => CliError::new(message),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let config = match resolve_config(&project_root, cli.json) {
        Ok(config) => config,
        Err(err) => {
            let mode = cli.format.unwrap_or(if cli.json {
                OutputMode::Json
            } else {
                OutputMode::Text
            });
            render_error(
                mode,
                &CliError::from_code(format!("{err:#}"), ErrorCode::ConfigParseError),
            )?;
            std::process::exit(1);
        }
    };
    let output = resolve_output_mode(cli.format, &config.resolved_output);
    debug!(?output, "output mode resolved");

    let calendar = config.project.calendar.calendar();
    let command_result = match &cli.command {
        Commands::Hours(args) => cmd::hours::run_hours(args, &calendar, output),
        Commands::Effort(args) => cmd::effort::run_effort(args, &config.project, output),
        Commands::Flow(args) => cmd::flow::run_flow(args, &config.project, output),
        Commands::Forecast(args) => cmd::forecast::run_forecast(args, &config.project, output),
    };

    if let Err(err) = command_result {
        render_error(output, &cli_error(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
