//! Crawl list generation
//!
//! Each run writes one segment into the `tocrawl` queue:
//! ```text
//! {root}/tocrawl/{n}/
//! ├── github.com       # CrawlItem lines, crawl order
//! ├── gitlab.com
//! ├── persons          # due person ids, all sites
//! └── .done
//! ```
//! Older done segments are superseded: whatever they listed is still due in
//! the database and shows up again in the new list.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pkgsift_core::fmt_num;
use pkgsift_store::{JsonlWriter, Segments};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::db::CrawlerDb;
use crate::entry::CrawlingEntry;
use crate::ident::host_of;

/// File holding the due persons of a crawl list segment.
pub const PERSONS_FILE: &str = "persons";

/// One line of a crawl list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSummary {
    /// Segment written into the `tocrawl` queue.
    pub segment: String,
    /// Packages listed per host, in host order.
    pub hosts: Vec<(String, usize)>,
    pub packages: usize,
    pub persons: usize,
    /// Due entries left out by the per-host cap.
    pub truncated: usize,
}

/// Write the due entries of `db` as a new crawl list segment in `tocrawl`.
///
/// Within a host, packages the baseline has never seen come first, then
/// the longest-overdue. At most `max_per_host` per host (and per person
/// site) are listed.
pub fn generate_crawl_lists(
    db: &CrawlerDb,
    now: DateTime<Utc>,
    baseline_ids: &FxHashSet<String>,
    max_per_host: usize,
    tocrawl: &Segments,
) -> Result<ListSummary> {
    for name in tocrawl.clear_undones()? {
        log::warn!("lists: removed unfinished list segment {name}");
    }

    let mut summary = ListSummary::default();
    let seg = tocrawl.gen_max_segment()?;
    summary.segment = seg.name().to_string();

    for (host, mut group) in group_by_host(db.due_packages(now)?) {
        group.sort_by_key(|(id, e)| (baseline_ids.contains(id), e.schedule_time));
        summary.truncated += group.len().saturating_sub(max_per_host);
        group.truncate(max_per_host);
        if group.is_empty() {
            continue;
        }

        let n = write_items(&seg.join(&host), group)?;
        summary.packages += n;
        summary.hosts.push((host, n));
    }

    let mut persons = Vec::new();
    for (_, mut group) in group_by_host(db.due_persons(now)?) {
        group.sort_by_key(|(_, e)| e.schedule_time);
        summary.truncated += group.len().saturating_sub(max_per_host);
        group.truncate(max_per_host);
        persons.extend(group);
    }
    if !persons.is_empty() {
        summary.persons = write_items(&seg.join(PERSONS_FILE), persons)?;
    }

    let manifest = seg.done()?;
    for old in tocrawl.list_dones()? {
        if old.name() != seg.name() {
            log::info!("lists: superseding list segment {}", old.name());
            old.remove()?;
        }
    }

    log::info!(
        "lists: segment {} ({}): {} packages over {} hosts, {} persons, {} over cap",
        summary.segment,
        manifest.short_hash(),
        fmt_num(summary.packages),
        summary.hosts.len(),
        fmt_num(summary.persons),
        fmt_num(summary.truncated)
    );
    Ok(summary)
}

fn group_by_host(
    due: Vec<(String, CrawlingEntry)>,
) -> BTreeMap<String, Vec<(String, CrawlingEntry)>> {
    let mut groups: BTreeMap<String, Vec<_>> = BTreeMap::new();
    for (id, entry) in due {
        groups
            .entry(host_of(&id).to_string())
            .or_default()
            .push((id, entry));
    }
    groups
}

fn write_items(path: &std::path::Path, group: Vec<(String, CrawlingEntry)>) -> Result<usize> {
    let mut w = JsonlWriter::create(path)?;
    for (id, entry) in group {
        w.write(&CrawlItem {
            id,
            etag: entry.etag,
        })?;
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::HostPathCheck;
    use crate::policy::SchedulePolicy;
    use chrono::{Duration, TimeZone};
    use pkgsift_store::read_jsonl;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        db: CrawlerDb,
        tocrawl: Segments,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db =
            CrawlerDb::open(&dir.path().join("crawler"), SchedulePolicy::default(), HostPathCheck)
                .unwrap();
        let tocrawl = Segments::open(dir.path().join("tocrawl")).unwrap();
        Fixture {
            _dir: dir,
            db,
            tocrawl,
        }
    }

    fn ids(items: &[CrawlItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn grouped_by_host_unseen_first() {
        let f = fixture();
        f.db.append_package("github.com/a/old", false, t(0));
        f.db.append_package("github.com/a/known", false, t(1));
        f.db.append_package("github.com/a/fresh", false, t(2));
        f.db.append_package("gitlab.com/b/c", false, t(0));

        let baseline: FxHashSet<String> = ["github.com/a/known".to_string()].into_iter().collect();
        let s = generate_crawl_lists(&f.db, t(10), &baseline, 100, &f.tocrawl).unwrap();
        assert_eq!(s.segment, "0");
        assert_eq!(s.packages, 4);
        assert_eq!(
            s.hosts,
            vec![("github.com".to_string(), 3), ("gitlab.com".to_string(), 1)]
        );

        let seg = f.tocrawl.find_max_done().unwrap().unwrap();
        let gh: Vec<CrawlItem> = read_jsonl(&seg.join("github.com")).unwrap();
        assert_eq!(
            ids(&gh),
            vec!["github.com/a/old", "github.com/a/fresh", "github.com/a/known"]
        );
    }

    #[test]
    fn only_due_and_capped() {
        let f = fixture();
        for i in 0..5 {
            f.db.append_package(&format!("github.com/a/p{i}"), false, t(i));
        }
        // Not due yet
        f.db.schedule_person("github.com:later", t(1000));
        f.db.append_person("github.com", "alice", t(0));

        let s = generate_crawl_lists(&f.db, t(10), &FxHashSet::default(), 2, &f.tocrawl).unwrap();
        assert_eq!(s.packages, 2);
        assert_eq!(s.truncated, 3);
        assert_eq!(s.persons, 1);

        let seg = f.tocrawl.find_max_done().unwrap().unwrap();
        let gh: Vec<CrawlItem> = read_jsonl(&seg.join("github.com")).unwrap();
        assert_eq!(ids(&gh), vec!["github.com/a/p0", "github.com/a/p1"]);
        let persons: Vec<CrawlItem> = read_jsonl(&seg.join(PERSONS_FILE)).unwrap();
        assert_eq!(ids(&persons), vec!["github.com:alice"]);
    }

    #[test]
    fn etag_carried_into_list() {
        let f = fixture();
        f.db.append_package("github.com/a/b", false, t(0) - Duration::days(30));
        f.db.schedule_package_success(
            "github.com/a/b",
            t(0) - Duration::days(30),
            Some("W/\"1\"".into()),
            &mut rand::rng(),
        );
        generate_crawl_lists(&f.db, t(0), &FxHashSet::default(), 10, &f.tocrawl).unwrap();
        let seg = f.tocrawl.find_max_done().unwrap().unwrap();
        let gh: Vec<CrawlItem> = read_jsonl(&seg.join("github.com")).unwrap();
        assert_eq!(gh[0].etag, "W/\"1\"");
    }

    #[test]
    fn new_list_supersedes_old() {
        let f = fixture();
        f.db.append_package("github.com/a/b", false, t(0));
        generate_crawl_lists(&f.db, t(1), &FxHashSet::default(), 10, &f.tocrawl).unwrap();
        std::fs::create_dir(f.tocrawl.root().join("7")).unwrap();

        let s = generate_crawl_lists(&f.db, t(2), &FxHashSet::default(), 10, &f.tocrawl).unwrap();
        assert_eq!(s.segment, "1");
        let names: Vec<String> = f
            .tocrawl
            .list_all()
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["1"]);
    }

    #[test]
    fn nothing_due_writes_empty_list() {
        let f = fixture();
        let s = generate_crawl_lists(&f.db, t(0), &FxHashSet::default(), 10, &f.tocrawl).unwrap();
        assert_eq!(s.packages, 0);
        let seg = f.tocrawl.find_max_done().unwrap().unwrap();
        assert!(seg.list_files().unwrap().is_empty());
    }
}
