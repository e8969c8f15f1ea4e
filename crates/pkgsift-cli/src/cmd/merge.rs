//! `pkgsift merge` - fold crawl deltas into the document baseline

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use pkgsift_core::{ProgressContext, fmt_num};
use pkgsift_merge::{DocInfo, IndexSink, MergeJob};
use pkgsift_store::JsonlWriter;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Partition count of the new baseline (default: merge.partitions)
    #[arg(short, long)]
    pub partitions: Option<usize>,

    /// Parallel partition reducers (default: merge.workers)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// After the swap, write every document as JSON lines for the indexer
    #[arg(long)]
    pub feed: Option<PathBuf>,
}

pub fn run(args: MergeArgs, config: &Config, progress: &ProgressContext) -> Result<ExitCode> {
    let mut merge_config = config.merge_config();
    if let Some(p) = args.partitions {
        merge_config.parts = p;
    }
    if let Some(w) = args.workers {
        merge_config.workers = w;
    }
    if !merge_config.exclude.is_empty() {
        log::info!("merge: {} exclude patterns", merge_config.exclude.len());
    }

    let job = MergeJob::new(
        config.baseline_dir(),
        config.queue_dir("newdocs"),
        merge_config,
    )?;
    let (summary, baseline) = job.run(progress)?;
    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }

    if let Some(path) = args.feed {
        let mut feed = JsonlFeed {
            out: JsonlWriter::create(&path)?,
            error: None,
        };
        let n = baseline.feed(&mut feed)?;
        if let Some(e) = feed.error {
            return Err(e);
        }
        feed.out.finish()?;
        log::info!("merge: fed {} documents to {}", fmt_num(n), path.display());
    }
    Ok(super::stage_exit())
}

/// Index sink that dumps documents for an out-of-process indexer.
struct JsonlFeed {
    out: JsonlWriter,
    error: Option<anyhow::Error>,
}

impl IndexSink for JsonlFeed {
    fn index(&mut self, doc: &DocInfo) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.out.write(doc) {
            self.error = Some(e);
        }
    }
}
