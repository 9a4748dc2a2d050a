//! JSON Lines capture of flat records, written before reconciliation so the
//! reconciliation phase can be re-run without the upstream APIs.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lm_schemas::FlatRecord;

pub struct CacheWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

impl CacheWriter {
    /// Truncates an existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("open cache file {}", path.display()))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write_all(&mut self, records: &[FlatRecord]) -> Result<()> {
        for r in records {
            serde_json::to_writer(&mut self.out, r).context("serialize cached record")?;
            self.out
                .write_all(b"\n")
                .with_context(|| format!("write cache file {}", self.path.display()))?;
            self.written += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("flush cache file {}", self.path.display()))
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Every record in file order. Blank lines are ignored.
pub fn read_cache(path: impl AsRef<Path>) -> Result<Vec<FlatRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open cache file {}", path.display()))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read cache file {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let rec: FlatRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid cached record", path.display(), i + 1))?;
        out.push(rec);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lm_schemas::{FieldValue, ResourceKind};
    use serde_json::json;

    #[test]
    fn cached_values_keep_precision_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");

        let mut rec = FlatRecord::new(ResourceKind::Hold, json!({"id": "h-1"}));
        rec.set("id", FieldValue::Text("h-1".into()));
        rec.set("amount", FieldValue::Number("4.2300".parse().unwrap()));
        rec.set(
            "created_at",
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2014, 11, 6, 10, 34, 47).unwrap()),
        );

        let mut w = CacheWriter::create(&path).unwrap();
        w.write_all(std::slice::from_ref(&rec)).unwrap();
        w.flush().unwrap();
        assert_eq!(w.written(), 1);

        let line = std::fs::read_to_string(&path).unwrap();
        assert!(line.contains(r#""value":"4.2300""#), "{line}");

        let back = read_cache(&path).unwrap();
        assert_eq!(back, vec![rec]);
    }

    #[test]
    fn corrupt_line_is_reported_with_its_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "\n{not json}\n").unwrap();
        let err = read_cache(&path).unwrap_err();
        assert!(format!("{err}").contains(":2: invalid cached record"), "{err}");
    }
}
