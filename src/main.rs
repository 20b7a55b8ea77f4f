mod config;
mod error;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::pipeline::{ChurchSource, PeopleScope, Pipeline, PipelineStats};

#[derive(Parser)]
#[command(
    name = "church-etl",
    about = "Scrape church directory listings into CSV and JSON",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Full megachurch list → CSV
    Megachurches {
        /// Seconds between requests
        #[arg(long)]
        delay: Option<f64>,

        /// Output CSV (default: <data_dir>/megachurches.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clergy listing for one conference, or for every known conference
    #[command(group(ArgGroup::new("scope").required(true).args(["conference", "all"])))]
    People {
        /// Single conference ID (e.g. 3067919)
        #[arg(long)]
        conference: Option<String>,

        /// Every conference in the conferences file
        #[arg(long)]
        all: bool,

        #[arg(long)]
        delay: Option<f64>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Conferences JSON (default: <data_dir>/conferences.json)
        #[arg(long)]
        conferences: Option<PathBuf>,
    },

    /// Pastor pages listed in a people export → work history JSON
    WorkHistory {
        /// People JSON with a URL field per person
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Only the first N pastors
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        delay: Option<f64>,

        /// Also write a flattened CSV next to the JSON
        #[arg(long)]
        csv: bool,
    },

    /// Church detail pages → JSON
    #[command(group(ArgGroup::new("source").required(true).args(["url", "input"])))]
    Churches {
        /// A single church page
        #[arg(long)]
        url: Option<String>,

        /// Work history JSON whose appointment links are followed
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        delay: Option<f64>,

        #[arg(long)]
        csv: bool,
    },

    /// Jurisdictions, conferences and districts from the statistics page
    Stats {
        /// Statistics year (default from config)
        #[arg(long)]
        year: Option<String>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        conferences: Option<PathBuf>,
    },

    /// Any paginated listing, strategy picked automatically → JSON + CSV
    Table {
        #[arg(long)]
        url: String,

        #[arg(long)]
        max_pages: Option<u32>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Command {
    fn delay(&self) -> Option<f64> {
        match self {
            Command::Megachurches { delay, .. }
            | Command::People { delay, .. }
            | Command::WorkHistory { delay, .. }
            | Command::Churches { delay, .. } => *delay,
            Command::Stats { .. } | Command::Table { .. } => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "church_directory_etl=info,warn",
        1 => "church_directory_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(secs) = cli.command.delay() {
        config.scraper.set_delay_secs(secs);
    }
    let data_dir = config.storage.data_dir.clone();
    let pipeline = Pipeline::new(config)?;

    let stats = match cli.command {
        Command::Megachurches { output, .. } => {
            let _t = utils::Timer::start("Megachurch list");
            pipeline.run_megachurches(output).await?
        }

        Command::People {
            conference,
            all,
            output_dir,
            conferences,
            ..
        } => {
            let _t = utils::Timer::start("People listing");
            let scope = match conference {
                Some(id) if !all => PeopleScope::One(id),
                _ => PeopleScope::All(conferences.unwrap_or_else(|| data_dir.join("conferences.json"))),
            };
            pipeline.run_people(scope, output_dir).await?
        }

        Command::WorkHistory {
            input,
            output,
            limit,
            csv,
            ..
        } => {
            let _t = utils::Timer::start("Work history");
            pipeline.run_work_history(&input, &output, limit, csv).await?
        }

        Command::Churches {
            url,
            input,
            output,
            limit,
            csv,
            ..
        } => {
            let _t = utils::Timer::start("Church details");
            let source = match (url, input) {
                (Some(url), _) => ChurchSource::Url(url),
                (None, Some(path)) => ChurchSource::WorkHistory(path),
                (None, None) => anyhow::bail!("one of --url or --input is required"),
            };
            pipeline.run_churches(source, output, limit, csv).await?
        }

        Command::Stats {
            year,
            output_dir,
            conferences,
        } => {
            let _t = utils::Timer::start("Statistics");
            pipeline.run_stats(year, output_dir, conferences).await?
        }

        Command::Table {
            url,
            max_pages,
            output,
        } => {
            let _t = utils::Timer::start(format!("Listing {}", url));
            pipeline.run_table(&url, max_pages, output).await?
        }
    };

    report(&stats);
    Ok(())
}

fn report(stats: &PipelineStats) {
    info!(
        "Done: {} units | {} records | {} failed",
        stats.units,
        utils::fmt_count(stats.records),
        stats.failed
    );
}
