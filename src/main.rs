//! Command-line entry point for the weather ETL.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use weather_etl::{DateWindow, Pipeline, RunPlan, RunSummary, SinkTarget, SPANISH_CITIES};

#[derive(Debug, Parser)]
#[command(
    name = "weather-etl",
    version,
    about = "Load hourly weather for Spanish cities from Open-Meteo into BigQuery"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Where rows are written.
    #[arg(long, value_enum, global = true, default_value_t = SinkKind::Bigquery)]
    sink: SinkKind,

    /// Output file for `--sink ndjson`.
    #[arg(long, global = true, default_value = "weather.ndjson")]
    output: PathBuf,

    /// Base URL of the archive API.
    #[arg(long, global = true)]
    archive_url: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// The table named by the GCP_* environment variables.
    Bigquery,
    /// A local newline-delimited JSON file.
    Ndjson,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Backfill a campaign in weekly windows, writing after every window.
    Bulk {
        /// First day of the campaign.
        #[arg(long, default_value = "2025-01-01")]
        start: NaiveDate,

        /// Last day of the campaign, inclusive.
        #[arg(long, default_value = "2025-06-22")]
        end: NaiveDate,

        /// Pause between archive calls in milliseconds.
        #[arg(long)]
        pace_ms: Option<u64>,
    },

    /// Load one day for every city in a single write.
    Daily {
        /// Day to load. Defaults to yesterday in local time.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Pause between archive calls in milliseconds.
        #[arg(long)]
        pace_ms: Option<u64>,
    },
}

impl Command {
    fn plan(&self) -> anyhow::Result<RunPlan> {
        let (plan, pace_ms) = match *self {
            Command::Bulk {
                start,
                end,
                pace_ms,
            } => {
                if start > end {
                    bail!("Campaign start {start} is after its end {end}");
                }
                (RunPlan::bulk(&SPANISH_CITIES, start, end), pace_ms)
            }
            Command::Daily { date, pace_ms } => {
                let day = date.unwrap_or_else(|| DateWindow::yesterday().start());
                (RunPlan::daily(&SPANISH_CITIES, day), pace_ms)
            }
        };
        Ok(match pace_ms {
            Some(ms) => plan.with_pacing(Duration::from_millis(ms)),
            None => plan,
        })
    }
}

impl Cli {
    fn target(&self) -> SinkTarget {
        match self.sink {
            SinkKind::Bigquery => SinkTarget::BigQuery,
            SinkKind::Ndjson => SinkTarget::NdjsonFile(self.output.clone()),
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    let plan = cli.command.plan()?;
    let pipeline = Pipeline::connect(&cli.target(), cli.archive_url.clone())
        .await
        .context("Failed to set up the run")?;
    Ok(pipeline.run(&plan).await)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(summary) if summary.is_total_failure() => {
            error!("No rows were written: {summary}");
            ExitCode::FAILURE
        }
        Ok(summary) => {
            info!("Done: {summary}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
