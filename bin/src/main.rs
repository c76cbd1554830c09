//! etftrack CLI - Keeps a local history of Taiwan ETF prices current.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use etftrack_lib::{Mode, Period, Settings, Tracker};
use std::path::{Path, PathBuf};
use tracing::Level;

mod commands;
mod display;

#[derive(Parser)]
#[command(name = "etftrack")]
#[command(about = "Historical ETF price tracker", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress progress output and logs)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Settings file (TOML). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the settings file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill the full history of every instrument
    Init,

    /// Fetch records newer than each instrument's last stored date
    Update,

    /// Run scheduled updates until interrupted (Ctrl-C)
    Schedule,

    /// Show the last stored date of every instrument and the latest run
    Status,

    /// Print stored prices
    Query {
        /// Instrument codes (e.g., 0050 0056)
        #[arg(required = true)]
        codes: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to the earliest stored date.
        #[arg(short, long, conflicts_with = "period")]
        from: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(short, long, conflicts_with = "period")]
        to: Option<String>,

        /// Look-back window ending at each instrument's last stored date
        /// (2w, 1m, 3m, 6m, 1y, 2y, 3y)
        #[arg(short, long)]
        period: Option<Period>,
    },

    /// List registered instruments
    List {
        /// Search pattern
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Check one instrument's stored data for gaps and outliers
    Report {
        /// Instrument code
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Show help if no command provided
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let settings = load_settings(cli.config.as_deref(), cli.data_dir)?;

    match command {
        Commands::Init => commands::run::run(&open(settings)?, Mode::Init, cli.quiet).await,
        Commands::Update => commands::run::run(&open(settings)?, Mode::Update, cli.quiet).await,
        Commands::Schedule => commands::schedule::schedule(&open(settings)?).await,
        Commands::Status => commands::status::status(&open(settings)?),
        Commands::Query {
            codes,
            from,
            to,
            period,
        } => commands::query::query(
            &open(settings)?,
            &codes,
            from.as_deref(),
            to.as_deref(),
            period,
        ),
        // Listing only needs the registry, not the data directory
        Commands::List { search } => {
            commands::list::list_instruments(&settings, search.as_deref())
        }
        Commands::Report { code } => commands::report::report(&open(settings)?, &code),
    }
}

/// Installs the log subscriber; `-v` raises the level, `--quiet` limits it to errors.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .init();
}

fn load_settings(config: Option<&Path>, data_dir: Option<PathBuf>) -> Result<Settings> {
    let mut settings = match config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }

    Ok(settings)
}

fn open(settings: Settings) -> Result<Tracker> {
    Tracker::new(settings).context("Failed to open the data directory")
}
