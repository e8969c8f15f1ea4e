//! JSON-lines payload files
//!
//! Segment payloads are one JSON value per line so producers can append
//! record by record and consumers can stream.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Streaming writer for one payload file.
pub struct JsonlWriter {
    path: PathBuf,
    out: BufWriter<fs::File>,
    written: usize,
}

impl JsonlWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)
            .with_context(|| format!("failed to encode record for {}", self.path.display()))?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and fsync. Returns the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        self.out
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        self.out
            .get_ref()
            .sync_all()
            .with_context(|| format!("failed to fsync {}", self.path.display()))?;
        Ok(self.written)
    }
}

/// Write all `records` to `path`, replacing it.
pub fn write_jsonl<'a, T: Serialize + 'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a T>,
) -> Result<usize> {
    let mut w = JsonlWriter::create(path)?;
    for r in records {
        w.write(r)?;
    }
    w.finish()
}

/// Read every record in `path`. Blank lines are skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad record", path.display(), i + 1))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github.com");
        let items = vec!["github.com/a/b".to_string(), "github.com/c/d".to_string()];
        assert_eq!(write_jsonl(&path, &items).unwrap(), 2);

        let back: Vec<String> = read_jsonl(&path).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn blank_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "1\n\n2\n   \n").unwrap();
        let back: Vec<u32> = read_jsonl(&path).unwrap();
        assert_eq!(back, vec![1, 2]);
    }

    #[test]
    fn bad_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "1\nnope\n").unwrap();
        let err = read_jsonl::<u32>(&path).unwrap_err();
        assert!(format!("{err:#}").contains(":2:"));
    }
}
