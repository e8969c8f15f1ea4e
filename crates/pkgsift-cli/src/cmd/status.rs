//! `pkgsift status` - crawler db, queues and baseline at a glance

use std::process::ExitCode;

use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pkgsift_core::fmt_num;
use pkgsift_merge::BaselineStore;
use pkgsift_store::Segments;

use crate::config::Config;

pub const QUEUES: [&str; 3] = ["import", "tocrawl", "newdocs"];

pub fn run(config: &Config) -> Result<ExitCode> {
    let db = super::open_db(config)?;
    let counts = db.counts(Utc::now())?;
    super::print_summary(
        "Crawler DB",
        &[
            (
                "Packages",
                format!(
                    "{} ({} due)",
                    fmt_num(counts.packages),
                    fmt_num(counts.packages_due)
                ),
            ),
            (
                "Persons",
                format!(
                    "{} ({} due)",
                    fmt_num(counts.persons),
                    fmt_num(counts.persons_due)
                ),
            ),
            ("Policy version", db.policy().version.to_string()),
        ],
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Queue").fg(Color::Cyan),
            Cell::new("Done").fg(Color::Cyan),
            Cell::new("Undone").fg(Color::Cyan),
            Cell::new("Latest").fg(Color::Cyan),
        ]);
    for name in QUEUES {
        let segs = Segments::open(config.queue_dir(name))?;
        let all = segs.list_all()?;
        let dones: Vec<_> = all.iter().filter(|s| s.is_done()).collect();
        let undone = all.len() - dones.len();
        let undone_cell = if undone > 0 {
            Cell::new(undone).fg(Color::Yellow)
        } else {
            Cell::new(undone)
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(dones.len()),
            undone_cell,
            Cell::new(dones.last().map_or_else(|| "-".to_string(), |s| s.name().to_string())),
        ]);
    }
    eprintln!("\n{table}");

    let store = BaselineStore::open(config.baseline_dir())?;
    match store.current() {
        Some(baseline) => {
            let manifest = baseline.manifest()?;
            eprintln!(
                "baseline: {} partitions, content {}, committed {}",
                baseline.parts()?,
                manifest.short_hash(),
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        None => eprintln!("baseline: none yet"),
    }
    Ok(ExitCode::SUCCESS)
}
