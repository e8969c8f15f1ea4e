//! Crawl stage: one crawl list segment → rescheduled database + deltas
//!
//! Host groups run in parallel, entries within a group in list order. Each
//! entry first checks the stage deadline and the stop flag; once either
//! trips, the rest of the group is counted as skipped and the list segment
//! is kept so the next run picks it up again.
//!
//! A kept list is replayed as is. Items an earlier run already handled are
//! no longer due in the database (or no longer tracked at all) and are
//! passed over without fetching, so a replay never revives a removed entry.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use indicatif::ProgressBar;
use parking_lot::Mutex;
use pkgsift_core::{Deadline, FailureBackoff, ProgressContext, WorkQueue, WorkSignal, fmt_num};
use pkgsift_merge::NewDocAction;
use pkgsift_store::{JsonlWriter, Segment, Segments, read_jsonl};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashSet;

use crate::db::{AppendOutcome, CrawlerDb};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::ident::trim_package_name;
use crate::lists::{CrawlItem, PERSONS_FILE};

/// The two queues the crawl stage sits between.
#[derive(Debug, Clone)]
pub struct CrawlQueues {
    pub tocrawl: Segments,
    pub newdocs: Segments,
}

impl CrawlQueues {
    /// `{root}/tocrawl` and `{root}/newdocs`, created if missing.
    pub fn open(root: &Path) -> Result<Self> {
        Ok(Self {
            tocrawl: Segments::open(root.join("tocrawl"))?,
            newdocs: Segments::open(root.join("newdocs"))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CrawlStageConfig {
    pub deadline: Deadline,
    /// Consecutive transient failures on one host before pausing it.
    pub failure_threshold: u32,
    pub failure_sleep: Duration,
    /// Seeds the per-host jitter RNGs. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for CrawlStageConfig {
    fn default() -> Self {
        Self {
            deadline: Deadline::unbounded(),
            failure_threshold: 10,
            failure_sleep: Duration::from_secs(60),
            seed: None,
        }
    }
}

/// Counters for one host group, or for a whole stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Crawl list segment processed, if there was one.
    pub list: Option<String>,
    pub hosts: usize,
    pub fetched: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub invalid: usize,
    /// Left unprocessed because of the deadline or a stop request.
    pub skipped: usize,
    /// Listed but already handled by an earlier run, or no longer tracked.
    pub settled: usize,
    pub persons: usize,
    /// New packages found on person pages.
    pub discovered: usize,
    pub deltas: usize,
    pub pauses: u32,
    /// `Continue` when every group ran to the end.
    pub signal: WorkSignal,
    pub elapsed: Duration,
}

impl Default for CrawlSummary {
    fn default() -> Self {
        Self {
            list: None,
            hosts: 0,
            fetched: 0,
            unchanged: 0,
            failed: 0,
            invalid: 0,
            skipped: 0,
            settled: 0,
            persons: 0,
            discovered: 0,
            deltas: 0,
            pauses: 0,
            signal: WorkSignal::Continue,
            elapsed: Duration::ZERO,
        }
    }
}

fn severity(s: WorkSignal) -> u8 {
    match s {
        WorkSignal::Continue => 0,
        WorkSignal::Deadline => 1,
        WorkSignal::Stop => 2,
    }
}

impl CrawlSummary {
    pub fn absorb(&mut self, other: &CrawlSummary) {
        self.hosts += other.hosts;
        self.fetched += other.fetched;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.invalid += other.invalid;
        self.skipped += other.skipped;
        self.settled += other.settled;
        self.persons += other.persons;
        self.discovered += other.discovered;
        self.deltas += other.deltas;
        self.pauses += other.pauses;
        if severity(other.signal) > severity(self.signal) {
            self.signal = other.signal;
        }
    }

    /// Whether every listed entry was attempted.
    pub fn is_complete(&self) -> bool {
        self.signal.is_continue()
    }

    pub fn log(&self) {
        log::info!(
            "crawl: {} fetched, {} unchanged, {} failed, {} invalid, {} skipped, {} settled; \
             {} persons (+{} packages); {} deltas over {} hosts [{}, {:.1}s]",
            fmt_num(self.fetched),
            fmt_num(self.unchanged),
            fmt_num(self.failed),
            fmt_num(self.invalid),
            fmt_num(self.skipped),
            fmt_num(self.settled),
            fmt_num(self.persons),
            fmt_num(self.discovered),
            fmt_num(self.deltas),
            self.hosts,
            self.signal,
            self.elapsed.as_secs_f64()
        );
    }

    pub fn print(&self) {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Result").fg(Color::Cyan),
                Cell::new("Count").fg(Color::Cyan),
            ]);
        table.add_row(vec![
            Cell::new("fetched"),
            Cell::new(fmt_num(self.fetched)).fg(Color::Green),
        ]);
        table.add_row(vec![Cell::new("not modified"), Cell::new(fmt_num(self.unchanged))]);
        table.add_row(vec![
            Cell::new("failed"),
            Cell::new(fmt_num(self.failed)).fg(Color::Yellow),
        ]);
        table.add_row(vec![
            Cell::new("invalid"),
            Cell::new(fmt_num(self.invalid)).fg(Color::Red),
        ]);
        table.add_row(vec![Cell::new("skipped"), Cell::new(fmt_num(self.skipped))]);
        table.add_row(vec![Cell::new("settled"), Cell::new(fmt_num(self.settled))]);
        table.add_row(vec![Cell::new("persons"), Cell::new(fmt_num(self.persons))]);
        table.add_row(vec![
            Cell::new("discovered"),
            Cell::new(fmt_num(self.discovered)),
        ]);
        eprintln!("\n{table}");
        eprintln!(
            "{} deltas from {} hosts in {:.1}s ({}), {} host pauses",
            fmt_num(self.deltas),
            self.hosts,
            self.elapsed.as_secs_f64(),
            self.signal,
            self.pauses
        );
    }
}

struct HostGroup {
    host: String,
    items: Vec<CrawlItem>,
}

/// Crawl the latest list in `queues.tocrawl`.
///
/// Returns an error only for storage failures; fetch failures are
/// counted and rescheduled.
pub fn run_crawl_stage<F: Fetcher>(
    db: &CrawlerDb,
    queues: &CrawlQueues,
    fetcher: &F,
    baseline_ids: &FxHashSet<String>,
    config: &CrawlStageConfig,
    progress: &ProgressContext,
) -> Result<CrawlSummary> {
    let start = Instant::now();
    for name in queues.newdocs.clear_undones()? {
        log::warn!("crawl: removed unfinished delta segment {name}");
    }

    let Some(list) = queues.tocrawl.find_max_done()? else {
        log::info!("crawl: no crawl list, nothing to do");
        return Ok(CrawlSummary::default());
    };

    let queue = WorkQueue::filtered(read_groups(&list)?, |g| !g.items.is_empty());
    let out = queues.newdocs.gen_new_segment()?;
    let workers = queue.worker_count();
    log::info!(
        "crawl: list {} with {} host groups, {} workers",
        list.name(),
        queue.total(),
        workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("failed to create crawl thread pool")?;

    let abort = AtomicBool::new(false);
    let worker = HostWorker {
        db,
        fetcher,
        baseline_ids,
        config,
        out: &out,
        abort: &abort,
    };
    let host_stats: Mutex<Vec<CrawlSummary>> = Mutex::new(Vec::new());
    let first_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);

    pool.scope(|s| {
        for _ in 0..workers {
            s.spawn(|_| {
                while let Some((idx, group)) = queue.next() {
                    let pb = progress.unit_bar(&group.host, group.items.len() as u64);
                    match worker.run(idx, group, &pb) {
                        Ok(stats) => host_stats.lock().push(stats),
                        Err(e) => {
                            log::error!("crawl: {}: {e:#}", group.host);
                            abort.store(true, Ordering::Relaxed);
                            first_error.lock().get_or_insert(e);
                        }
                    }
                    pb.finish_and_clear();
                }
            });
        }
    });

    if let Some(e) = first_error.into_inner() {
        return Err(e.context(format!("crawl of list {} failed", list.name())));
    }

    let mut summary = CrawlSummary {
        list: Some(list.name().to_string()),
        ..CrawlSummary::default()
    };
    for stats in host_stats.into_inner() {
        summary.absorb(&stats);
    }

    if summary.deltas > 0 {
        let manifest = out.done()?;
        log::info!(
            "crawl: delta segment {} ({})",
            out.name(),
            manifest.short_hash()
        );
    } else {
        out.remove()?;
    }
    if summary.is_complete() {
        list.remove()?;
    } else {
        log::warn!(
            "crawl: {} with {} entries left, keeping list {}",
            summary.signal,
            fmt_num(summary.skipped),
            list.name()
        );
    }
    db.sync()?;

    summary.elapsed = start.elapsed();
    summary.log();
    Ok(summary)
}

fn read_groups(list: &Segment) -> Result<Vec<HostGroup>> {
    let mut groups = Vec::new();
    for path in list.list_files()? {
        let host = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("bad list file {}", path.display()))?;
        let items = read_jsonl(&path)?;
        groups.push(HostGroup { host, items });
    }
    Ok(groups)
}

struct HostWorker<'a, F> {
    db: &'a CrawlerDb,
    fetcher: &'a F,
    baseline_ids: &'a FxHashSet<String>,
    config: &'a CrawlStageConfig,
    out: &'a Segment,
    abort: &'a AtomicBool,
}

impl<F: Fetcher> HostWorker<'_, F> {
    fn check(&self) -> WorkSignal {
        if self.abort.load(Ordering::Relaxed) {
            return WorkSignal::Stop;
        }
        self.config.deadline.check()
    }

    fn run(&self, idx: usize, group: &HostGroup, pb: &ProgressBar) -> Result<CrawlSummary> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ idx as u64),
            None => StdRng::from_os_rng(),
        };
        let mut backoff =
            FailureBackoff::new(self.config.failure_threshold, self.config.failure_sleep);
        let mut stats = CrawlSummary {
            hosts: 1,
            ..CrawlSummary::default()
        };
        let is_persons = group.host == PERSONS_FILE;
        let mut deltas: Option<JsonlWriter> = None;

        for (i, item) in group.items.iter().enumerate() {
            let signal = self.check();
            if !signal.is_continue() {
                stats.skipped = group.items.len() - i;
                stats.signal = signal;
                break;
            }

            let now = Utc::now();
            let tracked = if is_persons {
                self.db.person_entry(&item.id)
            } else {
                self.db.package_entry(&item.id)
            };
            let Some(entry) = tracked.filter(|e| e.is_due(now)) else {
                stats.settled += 1;
                pb.inc(1);
                continue;
            };

            if is_persons {
                self.crawl_person(item, now, &mut rng, &mut backoff, &mut stats);
            } else if let Some(delta) =
                self.crawl_package(item, &entry.etag, now, &mut rng, &mut backoff, &mut stats)
            {
                if deltas.is_none() {
                    deltas = Some(JsonlWriter::create(self.out.join(&group.host))?);
                }
                if let Some(w) = deltas.as_mut() {
                    w.write(&delta)?;
                }
            }
            pb.inc(1);
        }

        if let Some(w) = deltas {
            stats.deltas = w.finish()?;
        }
        stats.pauses = backoff.pauses();
        log::debug!(
            "crawl: {}: {} fetched, {} unchanged, {} failed, {} invalid, {} skipped, {} settled",
            group.host,
            stats.fetched,
            stats.unchanged,
            stats.failed,
            stats.invalid,
            stats.skipped,
            stats.settled
        );
        Ok(stats)
    }

    fn crawl_package(
        &self,
        item: &CrawlItem,
        etag: &str,
        now: DateTime<Utc>,
        rng: &mut StdRng,
        backoff: &mut FailureBackoff,
        stats: &mut CrawlSummary,
    ) -> Option<NewDocAction> {
        match self.fetcher.crawl(&item.id, etag) {
            Ok(FetchOutcome::Fetched(doc)) => {
                backoff.record_success();
                stats.fetched += 1;
                self.db
                    .schedule_package_success(&item.id, now, Some(doc.etag.clone()), rng);
                Some(NewDocAction::update(doc))
            }
            Ok(FetchOutcome::NotModified) => {
                backoff.record_success();
                stats.unchanged += 1;
                self.db.schedule_package_success(&item.id, now, None, rng);
                None
            }
            Err(e) if e.is_invalid() => {
                backoff.record_success();
                stats.invalid += 1;
                log::info!("crawl: {}: {e}, dropping", item.id);
                self.db.remove_package(&item.id);
                Some(NewDocAction::del(item.id.clone(), now))
            }
            Err(e) => {
                stats.failed += 1;
                log::debug!("crawl: {}: {e}", item.id);
                self.db.schedule_package_failure(&item.id, now);
                backoff.fail_and_wait(&item.id);
                None
            }
        }
    }

    fn crawl_person(
        &self,
        item: &CrawlItem,
        now: DateTime<Utc>,
        rng: &mut StdRng,
        backoff: &mut FailureBackoff,
        stats: &mut CrawlSummary,
    ) {
        match self.fetcher.crawl_person(&item.id) {
            Ok(packages) => {
                backoff.record_success();
                stats.persons += 1;
                for raw in &packages {
                    let id = trim_package_name(raw);
                    let outcome = self
                        .db
                        .append_package(id, self.baseline_ids.contains(id), now);
                    if matches!(outcome, AppendOutcome::Scheduled(_)) {
                        stats.discovered += 1;
                    }
                }
                self.db.schedule_person_success(&item.id, now, rng);
            }
            Err(e) if e.is_invalid() => {
                backoff.record_success();
                stats.invalid += 1;
                log::info!("crawl: person {}: {e}, dropping", item.id);
                self.db.remove_person(&item.id);
            }
            Err(e) => {
                stats.failed += 1;
                log::debug!("crawl: person {}: {e}", item.id);
                self.db.schedule_person_failure(&item.id, now);
                backoff.fail_and_wait(&item.id);
            }
        }
    }
}
