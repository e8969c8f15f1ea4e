//! `pkgsift segments` - inspect and repair queue segments

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pkgsift_store::{Segment, Segments, VerifyResult};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct SegmentsArgs {
    #[command(subcommand)]
    pub action: SegmentsAction,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum Queue {
    Import,
    Tocrawl,
    Newdocs,
}

impl Queue {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Tocrawl => "tocrawl",
            Self::Newdocs => "newdocs",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum SegmentsAction {
    /// List segments of a queue
    List {
        #[arg(value_enum)]
        queue: Queue,
    },
    /// Remove segments that were never marked done
    Clear {
        #[arg(value_enum)]
        queue: Queue,

        /// Actually delete (otherwise dry-run)
        #[arg(long)]
        confirm: bool,
    },
    /// Verify payload hashes against the completion manifests
    Verify {
        #[arg(value_enum)]
        queue: Queue,

        /// Specific segment to verify (default: all done)
        name: Option<String>,
    },
}

pub fn run(args: SegmentsArgs, config: &Config) -> Result<ExitCode> {
    let open = |q: Queue| Segments::open(config.queue_dir(q.dir_name()));
    match args.action {
        SegmentsAction::List { queue } => list(&open(queue)?),
        SegmentsAction::Clear { queue, confirm } => clear(&open(queue)?, confirm),
        SegmentsAction::Verify { queue, name } => verify(&open(queue)?, name.as_deref()),
    }
}

fn short(hash: &str) -> &str {
    &hash[..std::cmp::min(8, hash.len())]
}

fn list(segs: &Segments) -> Result<ExitCode> {
    let all = segs.list_all()?;
    if all.is_empty() {
        eprintln!("No segments in {}.", segs.root().display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Segment").fg(Color::Cyan),
            Cell::new("Files").fg(Color::Cyan),
            Cell::new("Content").fg(Color::Cyan),
            Cell::new("Created").fg(Color::Cyan),
            Cell::new("Done").fg(Color::Cyan),
        ]);

    for seg in &all {
        let files = seg.list_files()?.len();
        let (content, created, done_cell) = if seg.is_done() {
            match seg.manifest() {
                Ok(m) => (
                    short(&m.content_hash).to_string(),
                    m.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    Cell::new("yes").fg(Color::Green),
                ),
                Err(_) => (
                    "?".to_string(),
                    "?".to_string(),
                    Cell::new("unreadable").fg(Color::Yellow),
                ),
            }
        } else {
            (
                "-".to_string(),
                "-".to_string(),
                Cell::new("no").fg(Color::DarkGrey),
            )
        };
        table.add_row(vec![
            Cell::new(seg.name()),
            Cell::new(files),
            Cell::new(content),
            Cell::new(created),
            done_cell,
        ]);
    }

    eprintln!("\n{table}");
    eprintln!("{} segments total", all.len());
    Ok(ExitCode::SUCCESS)
}

fn clear(segs: &Segments, confirm: bool) -> Result<ExitCode> {
    if !confirm {
        let undone: Vec<Segment> = segs
            .list_all()?
            .into_iter()
            .filter(|s| !s.is_done())
            .collect();
        if undone.is_empty() {
            eprintln!("No undone segments to remove.");
        } else {
            eprintln!("Would remove {} undone segments:", undone.len());
            for seg in &undone {
                eprintln!("  {}", seg.name());
            }
            eprintln!("Run with --confirm to actually delete.");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let removed = segs.clear_undones()?;
    if removed.is_empty() {
        eprintln!("Nothing to clean up.");
    } else {
        eprintln!("Removed {} segments:", removed.len());
        for name in &removed {
            eprintln!("  {name}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn verify(segs: &Segments, name: Option<&str>) -> Result<ExitCode> {
    let targets = match name {
        Some(n) => vec![segs.segment(n)],
        None => segs.list_dones()?,
    };
    if targets.is_empty() {
        eprintln!("No segments to verify.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Segment").fg(Color::Cyan),
            Cell::new("Files").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
        ]);

    let mut all_ok = true;
    let mut results = Vec::new();
    for seg in &targets {
        let r = seg.verify()?;
        let ok = r.iter().all(|v| v.ok);
        all_ok &= ok;
        let status_cell = if ok {
            Cell::new("OK").fg(Color::Green)
        } else {
            Cell::new("FAIL").fg(Color::Red)
        };
        table.add_row(vec![Cell::new(seg.name()), Cell::new(r.len()), status_cell]);
        results.push((seg.name().to_string(), r));
    }
    eprintln!("\n{table}");

    for (seg, r) in &results {
        print_mismatches(seg, r);
    }

    if all_ok {
        eprintln!("All segments verified OK.");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Some segments have integrity issues!");
        Ok(ExitCode::FAILURE)
    }
}

fn print_mismatches(segment: &str, results: &[VerifyResult]) {
    for r in results {
        if !r.ok {
            eprintln!("  MISMATCH in {segment}: {}", r.path);
            eprintln!("    expected: {}", short(&r.expected));
            eprintln!("    actual:   {}", short(&r.actual));
        }
    }
}
