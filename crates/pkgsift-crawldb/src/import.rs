//! Import stage: package lists → crawler database
//!
//! Producers drop plain-text lists into the `import` queue, one package
//! path per line. `#` starts a comment line. Other processes write to this
//! queue at any time, so unfinished segments are never touched here.

use std::fs;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pkgsift_core::fmt_num;
use pkgsift_store::Segments;
use rustc_hash::FxHashSet;

use crate::db::{AppendOutcome, CrawlerDb};
use crate::ident::trim_package_name;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub segments: usize,
    pub lines: usize,
    pub scheduled: usize,
    pub rescheduled: usize,
    pub unchanged: usize,
    pub skipped_in_docs: usize,
    pub invalid: usize,
}

impl ImportSummary {
    fn record(&mut self, outcome: &AppendOutcome) {
        match outcome {
            AppendOutcome::Invalid => self.invalid += 1,
            AppendOutcome::SkippedInDocs => self.skipped_in_docs += 1,
            AppendOutcome::Unchanged => self.unchanged += 1,
            AppendOutcome::Rescheduled(_) => self.rescheduled += 1,
            AppendOutcome::Scheduled(_) => self.scheduled += 1,
        }
    }
}

/// Drain every done segment of `import` into `db`.
///
/// The database is synced before each consumed segment is removed, so a
/// crash re-imports at most the segment in flight.
pub fn import_packages(
    db: &CrawlerDb,
    import: &Segments,
    baseline_ids: &FxHashSet<String>,
    now: DateTime<Utc>,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for seg in import.list_dones()? {
        for path in seg.list_files()? {
            let file =
                fs::File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
            for line in BufReader::new(file).lines() {
                let line = line.with_context(|| format!("failed to read {}", path.display()))?;
                let id = trim_package_name(&line);
                if id.is_empty() || id.starts_with('#') {
                    continue;
                }
                summary.lines += 1;
                summary.record(&db.append_package(id, baseline_ids.contains(id), now));
            }
        }
        db.sync()?;
        seg.remove()?;
        summary.segments += 1;
        log::debug!("import: consumed segment {}", seg.name());
    }

    log::info!(
        "import: {} lines from {} segments: {} new, {} rescheduled, {} unchanged, \
         {} already documented, {} invalid",
        fmt_num(summary.lines),
        summary.segments,
        fmt_num(summary.scheduled),
        fmt_num(summary.rescheduled),
        fmt_num(summary.unchanged),
        fmt_num(summary.skipped_in_docs),
        fmt_num(summary.invalid)
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::HostPathCheck;
    use crate::policy::SchedulePolicy;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn imports_and_consumes_done_segments() {
        let dir = tempfile::tempdir().unwrap();
        let db = CrawlerDb::open(dir.path(), SchedulePolicy::default(), HostPathCheck).unwrap();
        let import = Segments::open(dir.path().join("import")).unwrap();

        let seg = import.gen_new_segment().unwrap();
        fs::write(
            seg.join("list.txt"),
            "# seed list\n\ngithub.com/acme/widgets\n  github.com/acme/gears \nnot-a-path\n\
             github.com/acme/documented\ngithub.com/acme/widgets\n",
        )
        .unwrap();
        seg.done().unwrap();

        // Undone segments are another producer's write in progress
        let partial = import.gen_new_segment().unwrap();
        fs::write(partial.join("list.txt"), "github.com/x/y\n").unwrap();

        let baseline: FxHashSet<String> = ["github.com/acme/documented".to_string()]
            .into_iter()
            .collect();
        let s = import_packages(&db, &import, &baseline, t(0)).unwrap();

        assert_eq!(s.segments, 1);
        assert_eq!(s.lines, 5);
        assert_eq!(s.scheduled, 2);
        assert_eq!(s.rescheduled, 1);
        assert_eq!(s.skipped_in_docs, 1);
        assert_eq!(s.invalid, 1);
        assert!(db.package_entry("github.com/acme/gears").is_some());
        assert!(db.package_entry("github.com/x/y").is_none());
        assert!(!db.is_modified());

        let left = import.list_all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name(), partial.name());
        assert!(partial.join("list.txt").exists());

        // Picked up once its producer finishes it
        partial.done().unwrap();
        let s = import_packages(&db, &import, &baseline, t(1)).unwrap();
        assert_eq!((s.segments, s.scheduled), (1, 1));
        assert!(db.package_entry("github.com/x/y").is_some());
        assert!(import.list_all().unwrap().is_empty());
    }

    #[test]
    fn empty_queue_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let db = CrawlerDb::open(dir.path(), SchedulePolicy::default(), HostPathCheck).unwrap();
        let import = Segments::open(dir.path().join("import")).unwrap();
        let s = import_packages(&db, &import, &FxHashSet::default(), t(0)).unwrap();
        assert_eq!(s, ImportSummary::default());
    }
}
