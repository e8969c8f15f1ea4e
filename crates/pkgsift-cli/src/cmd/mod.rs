//! Subcommands and the helpers they share

pub mod crawl;
pub mod db;
pub mod import;
pub mod merge;
pub mod schedule;
pub mod segments;
pub mod status;

use std::process::ExitCode;

use anyhow::Result;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pkgsift_crawldb::{CrawlerDb, HostPathCheck};
use pkgsift_merge::BaselineStore;
use rustc_hash::FxHashSet;

use crate::config::Config;

pub fn open_db(config: &Config) -> Result<CrawlerDb> {
    CrawlerDb::open(&config.crawler_dir(), config.policy(), HostPathCheck)
}

/// Package ids of the current baseline; empty before the first merge.
pub fn baseline_ids(config: &Config) -> Result<FxHashSet<String>> {
    let store = BaselineStore::open(config.baseline_dir())?;
    match store.current() {
        Some(baseline) => {
            let ids = baseline.ids()?;
            log::info!("baseline: {} documents", ids.len());
            Ok(ids)
        }
        None => Ok(FxHashSet::default()),
    }
}

/// 130 if a stop was requested while the stage ran, else success.
pub fn stage_exit() -> ExitCode {
    if pkgsift_core::is_shutdown_requested() {
        log::warn!("Shutdown requested");
        ExitCode::from(130)
    } else {
        ExitCode::SUCCESS
    }
}

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
