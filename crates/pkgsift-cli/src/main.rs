//! pkgsift - crawl scheduling and document baseline maintenance
//!
//! Each subcommand runs one pipeline stage against a data root:
//! import → schedule → crawl → merge.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "pkgsift")]
#[command(about = "Crawl scheduling and document baseline maintenance")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./pkgsift.toml or ~/.config/pkgsift/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data root (overrides [data] root)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Queue package lists and load them into the crawler database
    Import(cmd::import::ImportArgs),
    /// Write due packages and persons into a crawl list
    Schedule(cmd::schedule::ScheduleArgs),
    /// Crawl the latest crawl list and publish deltas
    Crawl(cmd::crawl::CrawlArgs),
    /// Fold published deltas into the document baseline
    Merge(cmd::merge::MergeArgs),
    /// Show database, queue and baseline state
    Status,
    /// Inspect and repair queue segments
    Segments(cmd::segments::SegmentsArgs),
    /// Crawler database maintenance
    Db(cmd::db::DbArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(pkgsift_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    pkgsift_core::init_logging(quiet, cli.debug, multi);

    pkgsift_core::install_signal_handlers().context("failed to install signal handlers")?;

    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };
    if let Some(root) = cli.root {
        config.data.root = root;
    }

    match cli.command {
        Command::Import(args) => cmd::import::run(args, &config),
        Command::Schedule(args) => cmd::schedule::run(args, &config),
        Command::Crawl(args) => cmd::crawl::run(args, &config, &progress),
        Command::Merge(args) => cmd::merge::run(args, &config, &progress),
        Command::Status => cmd::status::run(&config),
        Command::Segments(args) => cmd::segments::run(args, &config),
        Command::Db(args) => cmd::db::run(args, &config),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Data root",
        &config.data.root.display().to_string(),
    ]);
    table.add_row(vec![
        "Recrawl age",
        &format!(
            "{}d ±{}%",
            config.schedule.base_age_days, config.schedule.jitter_percent
        ),
    ]);
    table.add_row(vec![
        "Retry after failure",
        &format!("{}h", config.schedule.failure_age_hours),
    ]);
    table.add_row(vec![
        "Policy version",
        &config.schedule.version.to_string(),
    ]);
    table.add_row(vec![
        "Max per host",
        &config.crawl.max_per_host.to_string(),
    ]);
    table.add_row(vec![
        "Crawl deadline",
        &if config.crawl.deadline_minutes == 0 {
            "none".to_string()
        } else {
            format!("{}m", config.crawl.deadline_minutes)
        },
    ]);
    table.add_row(vec![
        "Failure backoff",
        &format!(
            "{} in a row → {}s",
            config.crawl.failure_threshold, config.crawl.failure_sleep_secs
        ),
    ]);
    table.add_row(vec![
        "Fetch command",
        &if config.crawl.fetch_command.is_empty() {
            "not set".to_string()
        } else {
            config.crawl.fetch_command.join(" ")
        },
    ]);
    table.add_row(vec![
        "Merge partitions",
        &config.merge.partitions.to_string(),
    ]);
    table.add_row(vec!["Merge workers", &config.merge.workers.to_string()]);
    table.add_row(vec![
        "Exclude patterns",
        &config.merge.exclude.len().to_string(),
    ]);

    eprintln!("\n{table}");
}
