//! Snapshot-backed in-memory map
//!
//! File layout:
//! ```text
//! {dir}/
//! ├── package.json        # last complete snapshot
//! └── package.json.new    # only present while a save is in flight (or after a crash)
//! ```
//!
//! Memory is the source of truth; the file lags until [`MemDb::sync`].
//! `sync` writes `.new`, removes the old file, then renames `.new` into
//! place, so after a crash at least one complete snapshot is on disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use pkgsift_core::WorkSignal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bump when the snapshot envelope changes shape.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a, V> {
    format_version: u32,
    saved_at: DateTime<Utc>,
    entries: &'a BTreeMap<String, V>,
}

#[derive(Deserialize)]
struct Snapshot<V> {
    format_version: u32,
    entries: BTreeMap<String, V>,
}

struct Contents<V> {
    entries: BTreeMap<String, V>,
    /// Bumped on every mutation.
    generation: u64,
    last_modified: Option<DateTime<Utc>>,
}

/// String-keyed map of `V`, mirrored to a single snapshot file.
///
/// Safe to share between threads of one process (`Arc<MemDb<V>>`). Two
/// processes must never open the same file for writing.
pub struct MemDb<V> {
    path: PathBuf,
    contents: RwLock<Contents<V>>,
    /// Generation of the last snapshot that reached disk.
    synced: AtomicU64,
    /// Serializes savers; held alongside a read lock so readers keep going.
    save_lock: Mutex<()>,
}

impl<V> MemDb<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Load the snapshot at `path`.
    ///
    /// Falls back to `{path}.new` when the primary file is missing (a save
    /// was interrupted between remove and rename). Neither present: empty
    /// map. A file that exists but fails to decode is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let new_path = new_path_of(&path);

        let entries = if path.exists() {
            read_snapshot(&path)?
        } else if new_path.exists() {
            log::warn!(
                "{} missing, recovering from {}",
                path.display(),
                new_path.display()
            );
            read_snapshot(&new_path)?
        } else {
            log::debug!("{} not found, starting empty", path.display());
            BTreeMap::new()
        };

        log::debug!("loaded {} entries from {}", entries.len(), path.display());
        Ok(Self {
            path,
            contents: RwLock::new(Contents {
                entries,
                generation: 0,
                last_modified: None,
            }),
            synced: AtomicU64::new(0),
            save_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.contents.read().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.contents.read().entries.contains_key(key)
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        let mut c = self.contents.write();
        c.entries.insert(key.into(), value);
        touch(&mut c);
    }

    /// Remove `key`. Returns the old value; a miss does not dirty the store.
    pub fn delete(&self, key: &str) -> Option<V> {
        let mut c = self.contents.write();
        let old = c.entries.remove(key);
        if old.is_some() {
            touch(&mut c);
        }
        old
    }

    pub fn count(&self) -> usize {
        self.contents.read().entries.len()
    }

    /// Whether there are mutations not yet written by [`sync`](Self::sync).
    pub fn is_modified(&self) -> bool {
        self.contents.read().generation != self.synced.load(Ordering::Acquire)
    }

    /// Time of the last mutation in this process, if any.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.contents.read().last_modified
    }

    /// Visit every entry in key order under the read lock.
    ///
    /// The callback returns `Continue` to go on or `Stop`/`Deadline` to end
    /// early; that signal is returned. An error aborts and propagates.
    pub fn iterate(&self, mut f: impl FnMut(&str, &V) -> Result<WorkSignal>) -> Result<WorkSignal> {
        let c = self.contents.read();
        for (k, v) in &c.entries {
            let signal = f(k, v)?;
            if !signal.is_continue() {
                return Ok(signal);
            }
        }
        Ok(WorkSignal::Continue)
    }

    /// Persist the map if it changed since the last sync.
    ///
    /// Callers must treat an error as fatal: the in-memory state is ahead of
    /// disk and continuing to mutate risks losing it.
    pub fn sync(&self) -> Result<()> {
        let _saving = self.save_lock.lock();
        let c = self.contents.read();
        if c.generation == self.synced.load(Ordering::Acquire) {
            return Ok(());
        }

        let new_path = new_path_of(&self.path);
        write_snapshot(&new_path, &c.entries)?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to remove {}", self.path.display()));
            }
        }
        fs::rename(&new_path, &self.path).with_context(|| {
            format!(
                "failed to rename {} → {}",
                new_path.display(),
                self.path.display()
            )
        })?;

        self.synced.store(c.generation, Ordering::Release);
        log::debug!("synced {} entries to {}", c.entries.len(), self.path.display());
        Ok(())
    }

    /// Write a read-only copy of the current contents to `dest`.
    ///
    /// Does not touch the dirty state.
    pub fn export(&self, dest: &Path) -> Result<()> {
        let c = self.contents.read();
        let tmp = new_path_of(dest);
        write_snapshot(&tmp, &c.entries)?;
        fs::rename(&tmp, dest)
            .with_context(|| format!("failed to rename {} → {}", tmp.display(), dest.display()))?;
        log::info!("exported {} entries to {}", c.entries.len(), dest.display());
        Ok(())
    }
}

fn touch<V>(c: &mut Contents<V>) {
    c.generation += 1;
    c.last_modified = Some(Utc::now());
}

fn new_path_of(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".new");
    PathBuf::from(s)
}

fn read_snapshot<V: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, V>> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let snapshot: Snapshot<V> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to decode snapshot {}", path.display()))?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        anyhow::bail!(
            "{}: snapshot format_version {} != supported {}",
            path.display(),
            snapshot.format_version,
            SNAPSHOT_FORMAT_VERSION
        );
    }
    Ok(snapshot.entries)
}

fn write_snapshot<V: Serialize>(path: &Path, entries: &BTreeMap<String, V>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dir {}", parent.display()))?;
    }
    let file =
        fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    let snapshot = SnapshotRef {
        format_version: SNAPSHOT_FORMAT_VERSION,
        saved_at: Utc::now(),
        entries,
    };
    serde_json::to_writer(&mut w, &snapshot)
        .with_context(|| format!("failed to encode snapshot {}", path.display()))?;
    w.flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    w.get_ref()
        .sync_all()
        .with_context(|| format!("failed to fsync {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_at(dir: &Path) -> MemDb<u32> {
        MemDb::load(dir.join("kind.json")).unwrap()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = db_at(dir.path());
        assert_eq!(db.count(), 0);
        assert!(!db.is_modified());
        assert!(db.last_modified().is_none());
    }

    #[test]
    fn roundtrip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let db = db_at(dir.path());
        db.put("a", 1);
        db.put("b", 2);
        db.put("c", 3);
        db.sync().unwrap();

        let fresh = db_at(dir.path());
        assert_eq!(fresh.count(), 3);
        assert_eq!(fresh.get("a"), Some(1));
        assert_eq!(fresh.get("b"), Some(2));
        assert_eq!(fresh.get("c"), Some(3));
    }

    #[test]
    fn recovers_from_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kind.json");
        let db = db_at(dir.path());
        db.put("x", 7);
        db.put("y", 8);
        db.sync().unwrap();

        // Crash between "remove old" and "rename new": only .new is left
        fs::rename(&path, new_path_of(&path)).unwrap();
        assert!(!path.exists());

        let fresh = db_at(dir.path());
        assert_eq!(fresh.get("x"), Some(7));
        assert_eq!(fresh.get("y"), Some(8));
    }

    #[test]
    fn primary_wins_over_stale_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kind.json");
        let db = db_at(dir.path());
        db.put("k", 1);
        db.sync().unwrap();

        fs::write(new_path_of(&path), b"garbage from an interrupted save").unwrap();
        let fresh = db_at(dir.path());
        assert_eq!(fresh.get("k"), Some(1));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kind.json"), b"not json").unwrap();
        assert!(MemDb::<u32>::load(dir.path().join("kind.json")).is_err());
    }

    #[test]
    fn sync_clears_dirty_flag_and_noops_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kind.json");
        let db = db_at(dir.path());

        db.sync().unwrap();
        assert!(!path.exists(), "clean store must not write");

        db.put("a", 1);
        assert!(db.is_modified());
        assert!(db.last_modified().is_some());
        db.sync().unwrap();
        assert!(!db.is_modified());
        assert!(path.exists());
        assert!(!new_path_of(&path).exists());
    }

    #[test]
    fn delete_miss_keeps_store_clean() {
        let dir = tempfile::tempdir().unwrap();
        let db = db_at(dir.path());
        assert_eq!(db.delete("nope"), None);
        assert!(!db.is_modified());

        db.put("a", 1);
        db.sync().unwrap();
        assert_eq!(db.delete("a"), Some(1));
        assert!(db.is_modified());
        db.sync().unwrap();
        assert_eq!(db_at(dir.path()).count(), 0);
    }

    #[test]
    fn export_leaves_dirty_flag() {
        let dir = tempfile::tempdir().unwrap();
        let db = db_at(dir.path());
        db.put("a", 1);

        let dest = dir.path().join("copy.json");
        db.export(&dest).unwrap();
        assert!(db.is_modified());

        let copy: MemDb<u32> = MemDb::load(&dest).unwrap();
        assert_eq!(copy.get("a"), Some(1));
    }

    #[test]
    fn iterate_in_key_order_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let db = db_at(dir.path());
        for (i, k) in ["c", "a", "b"].iter().enumerate() {
            db.put(*k, i as u32);
        }

        let mut seen = Vec::new();
        let signal = db
            .iterate(|k, _| {
                seen.push(k.to_string());
                Ok(if seen.len() == 2 {
                    WorkSignal::Stop
                } else {
                    WorkSignal::Continue
                })
            })
            .unwrap();
        assert_eq!(signal, WorkSignal::Stop);
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn iterate_propagates_errors() {
        let dir = tempfile::tempdir().unwrap();
        let db = db_at(dir.path());
        db.put("a", 1);
        let err = db.iterate(|_, _| anyhow::bail!("boom")).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn concurrent_puts_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let db = std::sync::Arc::new(db_at(dir.path()));
        std::thread::scope(|s| {
            for t in 0..4u32 {
                let db = &db;
                s.spawn(move || {
                    for i in 0..50u32 {
                        db.put(format!("{t}-{i}"), i);
                        if i % 10 == 0 {
                            db.sync().unwrap();
                        }
                    }
                });
            }
        });
        db.sync().unwrap();
        assert_eq!(db.count(), 200);
        assert_eq!(db_at(dir.path()).count(), 200);
    }
}
