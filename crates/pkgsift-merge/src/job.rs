//! The merge job: baseline + newdocs deltas → next baseline

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use pkgsift_core::ProgressContext;
use pkgsift_store::{Segment, Segments, read_jsonl};
use rayon::prelude::*;

use crate::baseline::{Baseline, BaselineStore, BaselineWriter};
use crate::doc::NewDocAction;
use crate::partition::{DEFAULT_PARTS, partition};
use crate::reduce::{ExcludeFilter, MergeSummary, Outcome, reduce_group};

/// Merge settings.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub parts: usize,
    /// Regex patterns; matching package ids are purged from the baseline.
    pub exclude: Vec<String>,
    /// Parallel partition reducers.
    pub workers: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            parts: DEFAULT_PARTS,
            exclude: Vec::new(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

pub struct MergeJob {
    baseline: BaselineStore,
    deltas: Segments,
    filter: ExcludeFilter,
    config: MergeConfig,
}

impl MergeJob {
    /// `baseline_dir` holds `docs/`; `newdocs_dir` is the delta queue.
    pub fn new(
        baseline_dir: impl Into<PathBuf>,
        newdocs_dir: impl Into<PathBuf>,
        config: MergeConfig,
    ) -> Result<Self> {
        anyhow::ensure!(config.parts > 0, "merge.parts must be positive");
        Ok(Self {
            baseline: BaselineStore::open(baseline_dir)?,
            deltas: Segments::open(newdocs_dir)?,
            filter: ExcludeFilter::new(&config.exclude)?,
            config,
        })
    }

    pub fn baseline_store(&self) -> &BaselineStore {
        &self.baseline
    }

    /// Run one merge. On success the new baseline is in place and the
    /// consumed delta segments are gone.
    pub fn run(&self, progress: &ProgressContext) -> Result<(MergeSummary, Baseline)> {
        let start = Instant::now();
        let line = progress.stage_line("merge");

        let segments = self.deltas.list_dones()?;
        line.set_message(format!("reading {} delta segments", segments.len()));
        let (buckets, delta_count) = self.load_deltas(&segments)?;
        log::info!(
            "merge: {delta_count} deltas from {} segments into {} partitions",
            segments.len(),
            self.config.parts
        );

        let current = self.baseline.current();
        let reader = match &current {
            Some(b) => Some(PartitionSource::new(b, self.config.parts)?),
            None => {
                log::info!("merge: no baseline yet, starting from deltas only");
                None
            }
        };

        let writer = self.baseline.begin_update(self.config.parts)?;
        let buckets: Vec<Mutex<Vec<NewDocAction>>> = buckets.into_iter().map(Mutex::new).collect();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
            .context("failed to create merge thread pool")?;

        line.set_message("reducing partitions");
        let partials: Vec<MergeSummary> = pool.install(|| {
            (0..self.config.parts)
                .into_par_iter()
                .map(|idx| {
                    let deltas = std::mem::take(&mut *buckets[idx].lock());
                    let originals = match &reader {
                        Some(r) => r.read(idx)?,
                        None => Vec::new(),
                    };
                    self.reduce_partition(idx, originals, deltas, &writer)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut summary = MergeSummary::default();
        for p in &partials {
            summary.absorb(p);
        }
        summary.deltas = delta_count;
        summary.segments = segments.len();

        line.set_message("swapping baseline");
        let baseline = self.baseline.commit(writer)?;

        for seg in &segments {
            seg.remove()?;
        }

        summary.elapsed = start.elapsed();
        line.finish_and_clear();
        Ok((summary, baseline))
    }

    /// Read every delta record from `segments`, bucketed by partition,
    /// keeping segment order then file order then line order.
    fn load_deltas(&self, segments: &[Segment]) -> Result<(Vec<Vec<NewDocAction>>, usize)> {
        let mut buckets = vec![Vec::new(); self.config.parts];
        let mut count = 0;
        for seg in segments {
            for file in seg.list_files()? {
                let records: Vec<NewDocAction> = read_jsonl(&file)?;
                count += records.len();
                for r in records {
                    buckets[partition(r.package(), self.config.parts)].push(r);
                }
            }
        }
        Ok((buckets, count))
    }

    fn reduce_partition(
        &self,
        idx: usize,
        originals: Vec<NewDocAction>,
        deltas: Vec<NewDocAction>,
        writer: &BaselineWriter,
    ) -> Result<MergeSummary> {
        let mut records = originals;
        records.extend(deltas);
        // Stable: arrival order survives within each package
        records.sort_by(|a, b| a.package().cmp(b.package()));

        let mut summary = MergeSummary::default();
        let mut out = Vec::new();
        let mut iter = records.into_iter().peekable();
        while let Some(first) = iter.next() {
            let mut group = vec![first];
            while let Some(next) = iter.next_if(|r| r.package() == group[0].package()) {
                group.push(next);
            }

            if self.filter.is_excluded(group[0].package()) {
                summary.record(Outcome::Excluded);
                continue;
            }
            let (outcome, doc) = reduce_group(group);
            summary.record(outcome);
            if let Some(doc) = doc {
                out.push(doc);
            }
        }

        writer.write_partition(idx, out)?;
        Ok(summary)
    }
}

/// Reads baseline partitions as `Original` records, re-partitioning when the
/// baseline was written with a different partition count.
enum PartitionSource<'a> {
    Aligned(&'a Baseline),
    Repartitioned(Vec<Mutex<Vec<NewDocAction>>>),
}

impl<'a> PartitionSource<'a> {
    fn new(baseline: &'a Baseline, parts: usize) -> Result<Self> {
        let existing = baseline.parts()?;
        if existing == parts || existing == 0 {
            return Ok(Self::Aligned(baseline));
        }
        log::warn!("merge: baseline has {existing} partitions, repartitioning into {parts}");
        let mut buckets = vec![Vec::new(); parts];
        baseline.for_each(|doc| {
            buckets[partition(&doc.package, parts)].push(NewDocAction::original(doc));
            Ok(())
        })?;
        Ok(Self::Repartitioned(buckets.into_iter().map(Mutex::new).collect()))
    }

    fn read(&self, idx: usize) -> Result<Vec<NewDocAction>> {
        match self {
            Self::Aligned(b) => Ok(b
                .read_partition(idx)?
                .into_iter()
                .map(NewDocAction::original)
                .collect()),
            Self::Repartitioned(buckets) => Ok(std::mem::take(&mut *buckets[idx].lock())),
        }
    }
}
