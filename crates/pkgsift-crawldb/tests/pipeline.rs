//! Import → crawl lists → crawl → merge, on one data root.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{Duration as TimeDelta, Utc};
use pkgsift_core::{Deadline, ProgressContext, WorkSignal};
use pkgsift_crawldb::{
    CrawlQueues, CrawlStageConfig, CrawlerDb, FetchError, FetchOutcome, Fetcher, HostPathCheck,
    SchedulePolicy, generate_crawl_lists, import_packages, run_crawl_stage,
};
use pkgsift_merge::{Baseline, DocInfo, MergeConfig, MergeJob};
use pkgsift_store::Segments;
use rustc_hash::FxHashSet;

/// Serves a synopsis per package; `removed/*` are gone upstream.
struct FakeSource {
    calls: AtomicUsize,
}

impl FakeSource {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Fetcher for FakeSource {
    fn crawl(&self, package: &str, etag: &str) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if package.contains("/removed/") {
            return Err(FetchError::Invalid("404".into()));
        }
        if etag == "v1" {
            return Ok(FetchOutcome::NotModified);
        }
        let mut doc = DocInfo::new(package, Utc::now());
        doc.synopsis = format!("about {package}");
        doc.etag = "v1".into();
        Ok(FetchOutcome::Fetched(doc))
    }

    fn crawl_person(&self, _id: &str) -> Result<Vec<String>, FetchError> {
        Ok(Vec::new())
    }
}

fn open_db(root: &Path) -> CrawlerDb {
    CrawlerDb::open(&root.join("crawler"), SchedulePolicy::default(), HostPathCheck).unwrap()
}

fn merge(root: &Path) -> Baseline {
    let job = MergeJob::new(
        root.join("baseline"),
        root.join("newdocs"),
        MergeConfig {
            parts: 8,
            ..MergeConfig::default()
        },
    )
    .unwrap();
    job.run(&ProgressContext::with_tty(false)).unwrap().1
}

fn stage_config() -> CrawlStageConfig {
    CrawlStageConfig {
        failure_sleep: Duration::ZERO,
        seed: Some(1),
        ..CrawlStageConfig::default()
    }
}

#[test]
fn full_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let quiet = ProgressContext::with_tty(false);

    let import = Segments::open(root.join("import")).unwrap();
    let seg = import.gen_new_segment().unwrap();
    fs::write(
        seg.join("seed.txt"),
        "github.com/acme/widgets\ngithub.com/acme/gears\ngitlab.com/removed/thing\nbogus\n",
    )
    .unwrap();
    seg.done().unwrap();

    // import
    let db = open_db(root);
    let summary = import_packages(&db, &import, &FxHashSet::default(), Utc::now()).unwrap();
    assert_eq!(summary.scheduled, 3);
    assert_eq!(summary.invalid, 1);
    drop(db);

    // lists, then crawl, from a fresh view of the db
    let db = open_db(root);
    let queues = CrawlQueues::open(root).unwrap();
    let lists =
        generate_crawl_lists(&db, Utc::now(), &FxHashSet::default(), 10, &queues.tocrawl).unwrap();
    assert_eq!(lists.packages, 3);

    let source = FakeSource::new();
    let crawl = run_crawl_stage(
        &db,
        &queues,
        &source,
        &FxHashSet::default(),
        &stage_config(),
        &quiet,
    )
    .unwrap();
    assert_eq!(crawl.fetched, 2);
    assert_eq!(crawl.invalid, 1);
    assert!(crawl.is_complete());
    drop(db);

    // merge
    let baseline = merge(root);
    let ids = baseline.ids().unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(
        baseline
            .get("github.com/acme/widgets")
            .unwrap()
            .unwrap()
            .synopsis,
        "about github.com/acme/widgets"
    );

    // Nothing is due right after a crawl
    let db = open_db(root);
    let lists = generate_crawl_lists(&db, Utc::now(), &ids, 10, &queues.tocrawl).unwrap();
    assert_eq!(lists.packages, 0);
    assert!(db.package_entry("gitlab.com/removed/thing").is_none());

    // Past the jitter band everything is due again and answers not-modified
    let later = Utc::now() + TimeDelta::days(12);
    let lists = generate_crawl_lists(&db, later, &ids, 10, &queues.tocrawl).unwrap();
    assert_eq!(lists.packages, 2);
    let crawl = run_crawl_stage(&db, &queues, &source, &ids, &stage_config(), &quiet).unwrap();
    assert_eq!(crawl.unchanged, 2);
    assert_eq!(crawl.deltas, 0);
    assert!(queues.newdocs.list_all().unwrap().is_empty());
}

#[test]
fn deadline_leaves_list_for_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let quiet = ProgressContext::with_tty(false);

    let db = open_db(root);
    let past = Utc::now() - TimeDelta::hours(1);
    for i in 0..5 {
        db.append_package(&format!("github.com/acme/p{i}"), false, past);
    }
    let queues = CrawlQueues::open(root).unwrap();
    generate_crawl_lists(&db, Utc::now(), &FxHashSet::default(), 10, &queues.tocrawl).unwrap();

    let source = FakeSource::new();
    let expired = CrawlStageConfig {
        deadline: Deadline::after(Duration::ZERO),
        ..stage_config()
    };
    let crawl =
        run_crawl_stage(&db, &queues, &source, &FxHashSet::default(), &expired, &quiet).unwrap();
    assert_eq!(crawl.signal, WorkSignal::Deadline);
    assert_eq!(crawl.skipped, 5);
    assert_eq!(source.calls.load(Ordering::Relaxed), 0);
    assert_eq!(queues.tocrawl.list_dones().unwrap().len(), 1);

    // Next run with time to spare finishes the same list
    let crawl = run_crawl_stage(
        &db,
        &queues,
        &source,
        &FxHashSet::default(),
        &stage_config(),
        &quiet,
    )
    .unwrap();
    assert_eq!(crawl.fetched, 5);
    assert!(queues.tocrawl.list_all().unwrap().is_empty());
    assert_eq!(queues.newdocs.list_dones().unwrap().len(), 1);
}
