//! Directory-based segment queues
//!
//! Directory layout:
//! ```text
//! {root}/{queue}/
//! ├── 0/
//! │   ├── github.com          # payload files (opaque to this module)
//! │   ├── bitbucket.org
//! │   └── .done               # completion marker + manifest
//! ├── 1/                      # no marker: still being written, or crashed
//! └── 3/
//!     └── .done
//! ```
//!
//! A producer creates a segment, writes payload files, then calls
//! [`Segment::done`]. Consumers only ever look at done segments and remove
//! them once consumed. A stage that owns a queue's producer side sweeps its
//! own partial output with [`Segments::clear_undones`].

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::manifest::{SegmentManifest, VerifyResult};

/// Fixed name of the completion marker inside each segment.
pub const DONE_MARKER: &str = ".done";

/// Order segment names: numeric names by value, non-numeric names lexically
/// among themselves, and any non-numeric name before every numeric one.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// One segment directory.
#[derive(Debug, Clone)]
pub struct Segment {
    name: String,
    path: PathBuf,
}

impl Segment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `file` inside the segment. No filesystem access.
    pub fn join(&self, file: &str) -> PathBuf {
        self.path.join(file)
    }

    pub fn is_done(&self) -> bool {
        self.join(DONE_MARKER).exists()
    }

    /// Mark the segment complete.
    ///
    /// Hashes the payload files and writes the manifest as the marker. A
    /// second call rewrites the marker with the same visibility effect.
    pub fn done(&self) -> Result<SegmentManifest> {
        let files = self.list_files()?;
        let manifest = SegmentManifest::compute(&files)?;
        manifest.write_to(&self.join(DONE_MARKER))?;
        log::debug!(
            "segment {} done: {} files, content {}",
            self.path.display(),
            files.len(),
            manifest.short_hash()
        );
        Ok(manifest)
    }

    /// Payload files, sorted by name. Excludes the marker and its temp file.
    pub fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)
            .with_context(|| format!("failed to list {}", self.path.display()))?
        {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(DONE_MARKER) {
                continue;
            }
            files.push(entry.path());
        }
        files.sort();
        Ok(files)
    }

    /// Manifest stored in the marker.
    pub fn manifest(&self) -> Result<SegmentManifest> {
        SegmentManifest::read_from(&self.join(DONE_MARKER))
    }

    /// Re-hash payload files against the marker's manifest.
    pub fn verify(&self) -> Result<Vec<VerifyResult>> {
        let manifest = self
            .manifest()
            .with_context(|| format!("no readable manifest in {}", self.path.display()))?;
        Ok(manifest.verify(&self.path))
    }

    /// Delete the segment and everything in it.
    pub fn remove(&self) -> Result<()> {
        fs::remove_dir_all(&self.path)
            .with_context(|| format!("failed to remove segment {}", self.path.display()))
    }
}

/// A queue: one directory holding many segments.
#[derive(Debug, Clone)]
pub struct Segments {
    root: PathBuf,
}

impl Segments {
    /// Open (creating if needed) the queue directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create queue dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle for segment `name`, whether or not it exists.
    pub fn segment(&self, name: &str) -> Segment {
        Segment {
            name: name.to_string(),
            path: self.root.join(name),
        }
    }

    /// Every segment directory, done or not, in name order.
    pub fn list_all(&self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("failed to list {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            segments.push(self.segment(&name));
        }
        segments.sort_by(|a, b| compare_names(&a.name, &b.name));
        Ok(segments)
    }

    pub fn list_dones(&self) -> Result<Vec<Segment>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(Segment::is_done)
            .collect())
    }

    /// Greatest done segment by [`compare_names`].
    pub fn find_max_done(&self) -> Result<Option<Segment>> {
        Ok(self.list_dones()?.pop())
    }

    /// Create the lowest-numbered segment not present (done or not).
    ///
    /// No ordering guarantee relative to other segments; for producer queues
    /// whose consumers take every done segment.
    pub fn gen_new_segment(&self) -> Result<Segment> {
        for n in 0u64.. {
            let seg = self.segment(&n.to_string());
            match fs::create_dir(&seg.path) {
                Ok(()) => {
                    log::debug!("new segment {}", seg.path.display());
                    return Ok(seg);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to create {}", seg.path.display()));
                }
            }
        }
        bail!("segment numbers exhausted in {}", self.root.display())
    }

    /// Create the segment after the greatest done one (`0` if none).
    ///
    /// The result orders after every done segment, so a consumer taking
    /// [`find_max_done`](Self::find_max_done) always sees the latest batch.
    /// An undone directory squatting on that name is crash debris and is
    /// replaced.
    pub fn gen_max_segment(&self) -> Result<Segment> {
        let next = match self.find_max_done()? {
            Some(seg) => match seg.name.parse::<u64>() {
                Ok(n) => match n.checked_add(1) {
                    Some(next) => next,
                    None => bail!("segment numbers exhausted in {}", self.root.display()),
                },
                Err(_) => 0,
            },
            None => 0,
        };
        let seg = self.segment(&next.to_string());
        if seg.path.exists() {
            log::warn!("removing stale undone segment {}", seg.path.display());
            seg.remove()?;
        }
        fs::create_dir(&seg.path)
            .with_context(|| format!("failed to create {}", seg.path.display()))?;
        log::debug!("max segment {}", seg.path.display());
        Ok(seg)
    }

    /// Remove every segment without a marker. Returns the removed names.
    pub fn clear_undones(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for seg in self.list_all()? {
            if !seg.is_done() {
                log::info!("clearing undone segment {}", seg.path.display());
                seg.remove()?;
                removed.push(seg.name);
            }
        }
        Ok(removed)
    }
}
