//! `pkgsift crawl` - crawl the latest list through an external fetch program
//!
//! The fetch program is invoked once per item:
//! ```text
//! <fetch_command...> package <path> <etag>   # stdout: DocInfo JSON
//! <fetch_command...> person <site:username>  # stdout: one package path per line
//! ```
//! Exit status 0 means success, 3 "not modified", 4 "no such thing"; any
//! other status is a transient failure.

use std::process::{Command, ExitCode, Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use pkgsift_core::{Deadline, ProgressContext, WorkSignal};
use pkgsift_crawldb::{CrawlQueues, FetchError, FetchOutcome, Fetcher, run_crawl_stage};
use pkgsift_merge::DocInfo;

use crate::config::Config;

const EXIT_NOT_MODIFIED: i32 = 3;
const EXIT_INVALID: i32 = 4;

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Stop starting new items after this many minutes (0 = no limit)
    #[arg(short, long)]
    pub deadline_minutes: Option<u64>,

    /// Fix the jitter RNG seed (reproducible schedules)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fetch program and arguments (default: crawl.fetch_command)
    #[arg(last = true)]
    pub fetch_command: Vec<String>,
}

pub fn run(args: CrawlArgs, config: &Config, progress: &ProgressContext) -> Result<ExitCode> {
    let command = if args.fetch_command.is_empty() {
        &config.crawl.fetch_command
    } else {
        &args.fetch_command
    };
    let fetcher = CommandFetcher::new(command)?;

    let mut stage = config.crawl_stage();
    if let Some(m) = args.deadline_minutes {
        stage.deadline = match m {
            0 => Deadline::unbounded(),
            m => Deadline::after(Duration::from_secs(m * 60)),
        };
    }
    stage.seed = args.seed;

    let db = super::open_db(config)?;
    let ids = super::baseline_ids(config)?;
    let queues = CrawlQueues::open(&config.data.root)?;
    let summary = run_crawl_stage(&db, &queues, &fetcher, &ids, &stage, progress)?;
    if progress.is_tty() {
        summary.print();
    }

    Ok(match summary.signal {
        WorkSignal::Stop => ExitCode::from(130),
        WorkSignal::Continue | WorkSignal::Deadline => ExitCode::SUCCESS,
    })
}

/// [`Fetcher`] backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
}

impl CommandFetcher {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("no fetch command: set crawl.fetch_command or pass one after --")?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn invoke(&self, extra: &[&str]) -> Result<Output, FetchError> {
        Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| FetchError::Transient(format!("failed to run {}: {e}", self.program)))
    }
}

/// Last stderr line, or the exit status if stderr was empty.
fn failure_message(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    match stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => line.to_string(),
        None => format!("fetcher {}", out.status),
    }
}

impl Fetcher for CommandFetcher {
    fn crawl(&self, package: &str, etag: &str) -> Result<FetchOutcome, FetchError> {
        let out = self.invoke(&["package", package, etag])?;
        match out.status.code() {
            Some(0) => serde_json::from_slice::<DocInfo>(&out.stdout)
                .map(FetchOutcome::Fetched)
                .map_err(|e| FetchError::Transient(format!("bad document for {package}: {e}"))),
            Some(EXIT_NOT_MODIFIED) => Ok(FetchOutcome::NotModified),
            Some(EXIT_INVALID) => Err(FetchError::Invalid(failure_message(&out))),
            _ => Err(FetchError::Transient(failure_message(&out))),
        }
    }

    fn crawl_person(&self, id: &str) -> Result<Vec<String>, FetchError> {
        let out = self.invoke(&["person", id])?;
        match out.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&out.stdout)
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()),
            Some(EXIT_INVALID) => Err(FetchError::Invalid(failure_message(&out))),
            _ => Err(FetchError::Transient(failure_message(&out))),
        }
    }
}
