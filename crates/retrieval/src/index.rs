//! Dense vector persistence.
//!
//! The store only talks to the [`VectorIndex`] trait; the directory layout
//! behind it is a black box. [`FileVectorIndex`] is the built-in engine: a
//! single JSON document with exhaustive L2 scan, adequate for the ≤ 10⁵
//! records a personal host accumulates.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use rh_domain::error::{Error, Result};

use crate::record::MemoryRecord;

/// Persistence engine for embedded records.
pub trait VectorIndex: Send + Sync {
    fn insert(&self, record: MemoryRecord) -> Result<()>;
    fn delete(&self, id: &str) -> Result<bool>;
    /// Snapshot of every record (metadata included).
    fn all(&self) -> Vec<MemoryRecord>;
    fn count(&self) -> usize;
    /// The `k` nearest records to `query` with their L2 distances,
    /// closest first.
    fn nearest(&self, query: &[f32], k: usize) -> Vec<(MemoryRecord, f32)>;
    /// Bump access counters for the given ids. Best effort.
    fn record_access(&self, ids: &[String], at: DateTime<Utc>) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-file vector index under `vector_store/records.json`.
pub struct FileVectorIndex {
    path: PathBuf,
    records: RwLock<Vec<MemoryRecord>>,
}

impl FileVectorIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        let path = dir.join("records.json");
        let records = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "malformed vector store, starting empty");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        tracing::info!(records = records.len(), path = %path.display(), "vector store loaded");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    fn persist(&self, records: &[MemoryRecord]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        std::fs::write(&self.path, json).map_err(Error::Io)
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

impl VectorIndex for FileVectorIndex {
    fn insert(&self, record: MemoryRecord) -> Result<()> {
        let mut records = self.records.write();
        records.push(record);
        self.persist(&records)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.id != id);
        let removed = records.len() != before;
        if removed {
            self.persist(&records)?;
        }
        Ok(removed)
    }

    fn all(&self) -> Vec<MemoryRecord> {
        self.records.read().clone()
    }

    fn count(&self) -> usize {
        self.records.read().len()
    }

    fn nearest(&self, query: &[f32], k: usize) -> Vec<(MemoryRecord, f32)> {
        let records = self.records.read();
        let mut scored: Vec<(MemoryRecord, f32)> = records
            .iter()
            .map(|r| (r.clone(), l2_distance(&r.embedding, query)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    fn record_access(&self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.write();
        for record in records.iter_mut() {
            if ids.contains(&record.id) {
                record.metadata.access_count += 1;
                record.metadata.last_accessed = at;
            }
        }
        self.persist(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordMetadata;

    fn rec(id: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            id: id.into(),
            text: format!("record {id}"),
            embedding,
            metadata: RecordMetadata::new("general"),
        }
    }

    #[test]
    fn insert_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let index = FileVectorIndex::open(tmp.path()).unwrap();
            index.insert(rec("a", vec![1.0, 0.0])).unwrap();
        }
        let index = FileVectorIndex::open(tmp.path()).unwrap();
        assert_eq!(index.count(), 1);
        assert_eq!(index.all()[0].id, "a");
    }

    #[test]
    fn nearest_orders_by_distance() {
        let tmp = tempfile::tempdir().unwrap();
        let index = FileVectorIndex::open(tmp.path()).unwrap();
        index.insert(rec("far", vec![10.0, 0.0])).unwrap();
        index.insert(rec("near", vec![1.0, 0.0])).unwrap();
        index.insert(rec("mid", vec![4.0, 0.0])).unwrap();

        let hits = index.nearest(&[0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "near");
        assert_eq!(hits[1].0.id, "mid");
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn delete_removes_and_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let index = FileVectorIndex::open(tmp.path()).unwrap();
        index.insert(rec("a", vec![0.0])).unwrap();
        assert!(index.delete("a").unwrap());
        assert!(!index.delete("a").unwrap());
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn record_access_bumps_counters() {
        let tmp = tempfile::tempdir().unwrap();
        let index = FileVectorIndex::open(tmp.path()).unwrap();
        index.insert(rec("a", vec![0.0])).unwrap();
        index.insert(rec("b", vec![1.0])).unwrap();

        let at = Utc::now();
        index.record_access(&["a".into()], at).unwrap();

        let all = index.all();
        let a = all.iter().find(|r| r.id == "a").unwrap();
        let b = all.iter().find(|r| r.id == "b").unwrap();
        assert_eq!(a.metadata.access_count, 1);
        assert_eq!(a.metadata.last_accessed, at);
        assert_eq!(b.metadata.access_count, 0);
    }
}
