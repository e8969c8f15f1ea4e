//! Canonical document baseline
//!
//! Directory layout:
//! ```text
//! {root}/baseline/
//! ├── docs/                 # current baseline (always complete)
//! │   ├── part-000.jsonl    # DocInfo lines sorted by package
//! │   ├── ...
//! │   └── .done
//! ├── docs-updated/         # being written by a merge
//! └── docs-old/             # previous baseline during the swap
//! ```
//!
//! A merge writes `docs-updated`, marks it done, then swaps:
//! `docs` → `docs-old`, `docs-updated` → `docs`, remove `docs-old`.
//! If the process dies between the two renames, [`BaselineStore::open`]
//! moves `docs-old` back.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pkgsift_store::{Segment, SegmentManifest, Segments, read_jsonl, write_jsonl};
use rustc_hash::FxHashSet;

use crate::doc::DocInfo;
use crate::partition::{parse_part_file_name, part_file_name, partition};

const CURRENT: &str = "docs";
const UPDATED: &str = "docs-updated";
const OLD: &str = "docs-old";

/// Consumer of a finished baseline (e.g. the full-text indexer).
pub trait IndexSink {
    fn index(&mut self, doc: &DocInfo);
}

impl<F: FnMut(&DocInfo)> IndexSink for F {
    fn index(&mut self, doc: &DocInfo) {
        self(doc)
    }
}

/// The `baseline/` directory and its swap protocol.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    segs: Segments,
}

impl BaselineStore {
    /// Open `dir`, repairing an interrupted swap.
    pub fn open(dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        let segs = Segments::open(dir)?;
        let store = Self { segs };
        store.recover()?;
        Ok(store)
    }

    fn recover(&self) -> Result<()> {
        let current = self.segs.segment(CURRENT);
        let old = self.segs.segment(OLD);
        if !current.path().exists() && old.is_done() {
            log::warn!(
                "baseline: {} missing, restoring {}",
                current.path().display(),
                old.path().display()
            );
            rename(old.path(), current.path())?;
        } else if current.is_done() && old.path().exists() {
            // Swap finished but cleanup did not
            old.remove()?;
        }
        Ok(())
    }

    /// The current baseline, if one was ever committed.
    pub fn current(&self) -> Option<Baseline> {
        let seg = self.segs.segment(CURRENT);
        seg.is_done().then(|| Baseline { seg })
    }

    /// Start writing a new baseline into a clean `docs-updated`.
    pub fn begin_update(&self, parts: usize) -> Result<BaselineWriter> {
        let seg = self.segs.segment(UPDATED);
        if seg.path().exists() {
            log::info!("baseline: removing stale {}", seg.path().display());
            seg.remove()?;
        }
        fs::create_dir_all(seg.path())
            .with_context(|| format!("failed to create {}", seg.path().display()))?;
        Ok(BaselineWriter { seg, parts })
    }

    /// Mark the new baseline done and swap it into place.
    pub fn commit(&self, writer: BaselineWriter) -> Result<Baseline> {
        let manifest = writer.seg.done()?;

        let current = self.segs.segment(CURRENT);
        let old = self.segs.segment(OLD);
        if old.path().exists() {
            old.remove()?;
        }
        if current.path().exists() {
            rename(current.path(), old.path())?;
        }
        rename(writer.seg.path(), current.path())?;
        if old.path().exists() {
            old.remove()?;
        }

        log::info!(
            "baseline: committed {} partitions (content {})",
            writer.parts,
            manifest.short_hash()
        );
        Ok(Baseline { seg: current })
    }
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)
        .with_context(|| format!("failed to rename {} → {}", from.display(), to.display()))
}

/// Writes partition files of a baseline under construction.
#[derive(Debug)]
pub struct BaselineWriter {
    seg: Segment,
    parts: usize,
}

impl BaselineWriter {
    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Write partition `idx`. Sorts by package so readers can binary-search.
    ///
    /// Distinct partitions may be written from different threads.
    pub fn write_partition(&self, idx: usize, mut docs: Vec<DocInfo>) -> Result<usize> {
        docs.sort_by(|a, b| a.package.cmp(&b.package));
        write_jsonl(&self.seg.join(&part_file_name(idx)), &docs)
    }
}

/// A committed, read-only baseline.
#[derive(Debug, Clone)]
pub struct Baseline {
    seg: Segment,
}

impl Baseline {
    /// Open the baseline directory at `dir` directly (export copies, tests).
    pub fn at(dir: &Path) -> Result<Self> {
        let parent = dir.parent().context("baseline dir has no parent")?;
        let name = dir
            .file_name()
            .context("baseline dir has no name")?
            .to_string_lossy()
            .into_owned();
        let seg = Segments::open(parent)?.segment(&name);
        anyhow::ensure!(seg.is_done(), "{} is not a complete baseline", dir.display());
        Ok(Self { seg })
    }

    pub fn path(&self) -> &Path {
        self.seg.path()
    }

    /// Completion manifest written at commit.
    pub fn manifest(&self) -> Result<SegmentManifest> {
        self.seg.manifest()
    }

    /// Partition count, from the partition files present.
    pub fn parts(&self) -> Result<usize> {
        let mut max = None;
        for f in self.seg.list_files()? {
            let name = f.file_name().map(|n| n.to_string_lossy().into_owned());
            if let Some(idx) = name.as_deref().and_then(parse_part_file_name) {
                max = max.max(Some(idx));
            }
        }
        Ok(max.map_or(0, |m| m + 1))
    }

    /// Documents in partition `idx`, sorted by package. A missing file is empty.
    pub fn read_partition(&self, idx: usize) -> Result<Vec<DocInfo>> {
        let path = self.seg.join(&part_file_name(idx));
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_jsonl(&path)
    }

    /// Look one package up by hashing it to its partition.
    pub fn get(&self, package: &str) -> Result<Option<DocInfo>> {
        let parts = self.parts()?;
        if parts == 0 {
            return Ok(None);
        }
        let docs = self.read_partition(partition(package, parts))?;
        Ok(docs
            .binary_search_by(|d| d.package.as_str().cmp(package))
            .ok()
            .map(|i| docs[i].clone()))
    }

    /// Visit every document, partition by partition.
    pub fn for_each(&self, mut f: impl FnMut(DocInfo) -> Result<()>) -> Result<usize> {
        let mut n = 0;
        for idx in 0..self.parts()? {
            for doc in self.read_partition(idx)? {
                f(doc)?;
                n += 1;
            }
        }
        Ok(n)
    }

    /// All package ids in the baseline.
    pub fn ids(&self) -> Result<FxHashSet<String>> {
        let mut ids = FxHashSet::default();
        self.for_each(|d| {
            ids.insert(d.package);
            Ok(())
        })?;
        Ok(ids)
    }

    /// Hand every document to an indexer.
    pub fn feed(&self, sink: &mut impl IndexSink) -> Result<usize> {
        self.for_each(|d| {
            sink.index(&d);
            Ok(())
        })
    }
}
