//! Segment completion manifest: written as the `.done` marker body
//!
//! Only the marker's existence decides whether a segment is visible. The
//! manifest it carries records what the producer wrote so `verify` can spot
//! payload files damaged or truncated after the fact.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CURRENT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentManifest {
    pub format_version: u32,
    /// Payload file name → full blake3 hex hash.
    pub file_hashes: BTreeMap<String, String>,
    /// Combined hash over all payload files in name order.
    pub content_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Verification result for a single payload file.
#[derive(Debug)]
pub struct VerifyResult {
    pub path: String,
    pub expected: String,
    pub actual: String,
    pub ok: bool,
}

fn hash_file(path: &Path) -> std::io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path)?;
    Ok(hasher.finalize())
}

impl SegmentManifest {
    /// Hash the given payload files (already sorted by the caller).
    pub fn compute(files: &[std::path::PathBuf]) -> Result<Self> {
        let mut file_hashes = BTreeMap::new();
        let mut combined = blake3::Hasher::new();

        for path in files {
            let h = hash_file(path).with_context(|| format!("failed to hash {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            combined.update(name.as_bytes());
            combined.update(h.as_bytes());
            file_hashes.insert(name, h.to_hex().to_string());
        }

        Ok(Self {
            format_version: CURRENT_FORMAT_VERSION,
            file_hashes,
            content_hash: combined.finalize().to_hex().to_string(),
            created_at: chrono::Utc::now(),
        })
    }

    /// First 8 hex chars of the content hash, for listings.
    pub fn short_hash(&self) -> &str {
        &self.content_hash[..self.content_hash.len().min(8)]
    }

    /// Write to `path` via a `.tmp` sibling so the marker never appears half-written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(self).context("failed to serialize manifest")?;
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to rename {} → {}", tmp.display(), path.display()))?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Re-hash the payload files in `dir` against the recorded hashes.
    pub fn verify(&self, dir: &Path) -> Vec<VerifyResult> {
        self.file_hashes
            .iter()
            .map(|(name, expected)| {
                let file_path = dir.join(name);
                let actual = if file_path.exists() {
                    match hash_file(&file_path) {
                        Ok(h) => h.to_hex().to_string(),
                        Err(e) => format!("error: {e}"),
                    }
                } else {
                    "MISSING".to_string()
                };
                VerifyResult {
                    path: name.clone(),
                    ok: actual == *expected,
                    expected: expected.clone(),
                    actual,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_files(dir: &Path, files: &[(&str, &[u8])]) -> Vec<std::path::PathBuf> {
        files
            .iter()
            .map(|(name, data)| {
                let p = dir.join(name);
                fs::write(&p, data).unwrap();
                p
            })
            .collect()
    }

    #[test]
    fn compute_empty() {
        let m = SegmentManifest::compute(&[]).unwrap();
        assert!(m.file_hashes.is_empty());
        assert_eq!(m.short_hash().len(), 8);
    }

    #[test]
    fn compute_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(dir.path(), &[("a.jsonl", b"a"), ("b.jsonl", b"b")]);
        let m1 = SegmentManifest::compute(&files).unwrap();
        let m2 = SegmentManifest::compute(&files).unwrap();
        assert_eq!(m1.content_hash, m2.content_hash);
        assert_eq!(m1.file_hashes.len(), 2);
    }

    #[test]
    fn roundtrip_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(dir.path(), &[("github.com", b"pkg\n")]);
        let m = SegmentManifest::compute(&files).unwrap();
        let marker = dir.path().join(".done");
        m.write_to(&marker).unwrap();

        let loaded = SegmentManifest::read_from(&marker).unwrap();
        assert_eq!(loaded.content_hash, m.content_hash);
        assert!(loaded.verify(dir.path()).iter().all(|r| r.ok));
    }

    #[test]
    fn verify_detects_corruption_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(dir.path(), &[("a", b"one"), ("b", b"two")]);
        let m = SegmentManifest::compute(&files).unwrap();

        fs::write(dir.path().join("a"), b"changed").unwrap();
        fs::remove_file(dir.path().join("b")).unwrap();

        let results = m.verify(dir.path());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.ok));
        assert_eq!(results[1].actual, "MISSING");
    }

    #[test]
    fn read_corrupt_marker_fails() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(".done");
        fs::write(&marker, b"").unwrap();
        assert!(SegmentManifest::read_from(&marker).is_err());
    }
}
