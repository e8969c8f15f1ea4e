//! `pkgsift schedule` - write the next crawl list

use std::process::ExitCode;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pkgsift_core::fmt_num;
use pkgsift_crawldb::generate_crawl_lists;
use pkgsift_store::Segments;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Cap on packages listed per host (default: crawl.max_per_host)
    #[arg(short, long)]
    pub max_per_host: Option<usize>,

    /// Hosts to show in the summary table
    #[arg(long, default_value_t = 20)]
    pub top: usize,
}

pub fn run(args: ScheduleArgs, config: &Config) -> Result<ExitCode> {
    let max_per_host = args.max_per_host.unwrap_or(config.crawl.max_per_host);
    let db = super::open_db(config)?;
    let ids = super::baseline_ids(config)?;
    let tocrawl = Segments::open(config.queue_dir("tocrawl"))?;

    let summary = generate_crawl_lists(&db, Utc::now(), &ids, max_per_host, &tocrawl)?;

    let mut hosts = summary.hosts.clone();
    hosts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Host").fg(Color::Cyan),
            Cell::new("Packages").fg(Color::Cyan),
        ]);
    for (host, n) in hosts.iter().take(args.top) {
        table.add_row(vec![Cell::new(host), Cell::new(fmt_num(*n))]);
    }
    if hosts.len() > args.top {
        table.add_row(vec![
            Cell::new(format!("... {} more", hosts.len() - args.top)).fg(Color::DarkGrey),
            Cell::new(""),
        ]);
    }
    eprintln!("\n{table}");
    eprintln!(
        "segment {}: {} packages, {} persons, {} over the per-host cap of {}",
        summary.segment,
        fmt_num(summary.packages),
        fmt_num(summary.persons),
        fmt_num(summary.truncated),
        max_per_host
    );
    Ok(super::stage_exit())
}
