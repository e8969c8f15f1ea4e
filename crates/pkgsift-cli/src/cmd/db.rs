//! `pkgsift db` - crawler database maintenance

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use pkgsift_crawldb::{CrawlingEntry, parse_person_id};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct DbArgs {
    #[command(subcommand)]
    pub action: DbAction,
}

#[derive(Subcommand, Debug)]
pub enum DbAction {
    /// Write read-only snapshot copies into a directory
    Export {
        /// Destination directory
        dir: PathBuf,
    },
    /// Make packages due now (they must already be tracked)
    Push {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Track a person (site:username), due now
    AddPerson {
        /// e.g. github.com:alice
        id: String,
    },
    /// Show the schedule entry of a package or person
    Show { id: String },
}

pub fn run(args: DbArgs, config: &Config) -> Result<ExitCode> {
    let db = super::open_db(config)?;
    match args.action {
        DbAction::Export { dir } => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            db.packages().export(&dir.join("package.json"))?;
            db.persons().export(&dir.join("person.json"))?;
            eprintln!("Exported to {}", dir.display());
        }
        DbAction::Push { packages } => {
            let now = Utc::now();
            let mut missing = 0;
            for p in &packages {
                if !db.push_to_crawl_package(p, now) {
                    eprintln!("not tracked: {p}");
                    missing += 1;
                }
            }
            db.sync()?;
            eprintln!("{} packages due now", packages.len() - missing);
            if missing > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        DbAction::AddPerson { id } => {
            let (site, username) = parse_person_id(&id)
                .with_context(|| format!("expected site:username, got {id:?}"))?;
            if db.append_person(site, username, Utc::now()) {
                db.sync()?;
                eprintln!("Tracking {id}");
            } else {
                eprintln!("{id} is already tracked");
            }
        }
        DbAction::Show { id } => {
            let entry = db.package_entry(&id).or_else(|| db.person_entry(&id));
            match entry {
                Some(e) => print_entry(&id, &e),
                None => {
                    eprintln!("{id}: not tracked");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_entry(id: &str, e: &CrawlingEntry) {
    let due = if e.is_due(Utc::now()) {
        "due".to_string()
    } else {
        format!("in {}h", (e.schedule_time - Utc::now()).num_hours())
    };
    super::print_summary(
        id,
        &[
            (
                "Scheduled",
                format!("{} ({due})", e.schedule_time.format("%Y-%m-%d %H:%M:%S UTC")),
            ),
            ("Policy version", e.version.to_string()),
            (
                "Etag",
                if e.etag.is_empty() {
                    "-".to_string()
                } else {
                    e.etag.clone()
                },
            ),
        ],
    );
}
