//! `pkgsift import` - queue package lists and load them into the crawler db

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use pkgsift_core::fmt_num;
use pkgsift_crawldb::import_packages;
use pkgsift_store::Segments;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Package list files (one path per line) to queue before importing
    #[arg(short, long)]
    pub file: Vec<PathBuf>,

    /// Only queue the files, leave the import to a later run
    #[arg(long)]
    pub queue_only: bool,
}

pub fn run(args: ImportArgs, config: &Config) -> Result<ExitCode> {
    let queue = Segments::open(config.queue_dir("import"))?;

    if !args.file.is_empty() {
        let seg = queue.gen_new_segment()?;
        for (i, src) in args.file.iter().enumerate() {
            // Index prefix keeps same-named files from different dirs apart
            let name = src
                .file_name()
                .map(|n| format!("{i:03}-{}", n.to_string_lossy()))
                .with_context(|| format!("not a file: {}", src.display()))?;
            fs::copy(src, seg.join(&name))
                .with_context(|| format!("failed to copy {}", src.display()))?;
        }
        let manifest = seg.done()?;
        log::info!(
            "import: queued {} files as segment {} ({})",
            args.file.len(),
            seg.name(),
            manifest.short_hash()
        );
    }
    if args.queue_only {
        return Ok(ExitCode::SUCCESS);
    }

    let db = super::open_db(config)?;
    let ids = super::baseline_ids(config)?;
    let summary = import_packages(&db, &queue, &ids, Utc::now())?;

    super::print_summary(
        "Import",
        &[
            ("Segments", summary.segments.to_string()),
            ("Lines", fmt_num(summary.lines)),
            ("New", fmt_num(summary.scheduled)),
            ("Rescheduled", fmt_num(summary.rescheduled)),
            ("Unchanged", fmt_num(summary.unchanged)),
            ("Already documented", fmt_num(summary.skipped_in_docs)),
            ("Invalid", fmt_num(summary.invalid)),
        ],
    );
    Ok(super::stage_exit())
}
