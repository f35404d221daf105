//! Persistence for shadow comparisons.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

use crate::comparison::ResponseComparison;
use crate::error::Error;

/// Append-only sink for comparison records.
#[async_trait]
pub trait ComparisonStore: Send + Sync + 'static {
    /// Append one record.
    async fn append(&self, comparison: &ResponseComparison) -> Result<(), Error>;
}

/// Comparisons written to a file, one JSON object per line.
#[derive(Debug)]
pub struct JsonlComparisonStore {
    file: AsyncMutex<File>,
    path: PathBuf,
}

impl JsonlComparisonStore {
    /// Open `path` for appending, creating it and its parent directory if
    /// needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::Io("error creating comparison log directory", e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::Io("error opening comparison log", e))?;

        Ok(Self {
            file: AsyncMutex::new(file),
            path,
        })
    }

    /// Location of the log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ComparisonStore for JsonlComparisonStore {
    async fn append(&self, comparison: &ResponseComparison) -> Result<(), Error> {
        let mut line = serde_json::to_vec(comparison)?;
        line.push(b'\n');

        // Whole lines only; concurrent appends must not interleave.
        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| Error::Io("error writing comparison log", e))?;
        file.flush()
            .await
            .map_err(|e| Error::Io("error flushing comparison log", e))
    }
}

/// Comparisons kept in memory.
#[derive(Debug, Default)]
pub struct MemoryComparisonStore {
    records: Mutex<Vec<ResponseComparison>>,
}

impl MemoryComparisonStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything appended so far.
    #[must_use]
    pub fn records(&self) -> Vec<ResponseComparison> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ComparisonStore for MemoryComparisonStore {
    async fn append(&self, comparison: &ResponseComparison) -> Result<(), Error> {
        self.records.lock().push(comparison.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[tokio::test]
    async fn test_jsonl_store_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shadow").join("comparisons.jsonl");

        let store = Arc::new(JsonlComparisonStore::open(&path).await.unwrap());
        let mut handles = Vec::new();
        for i in 0..10_u16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let comparison = ResponseComparison::new(format!("/reports/{i}"), "GET", 200, 200 + i, None);
                store.append(&comparison).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        drop(store);

        // Reopening appends rather than truncating.
        let reopened = JsonlComparisonStore::open(&path).await.unwrap();
        reopened
            .append(&ResponseComparison::new("/reports/last", "GET", 200, 0, None))
            .await
            .unwrap();

        let contents = fs::read_to_string(&path).await.unwrap();
        let records: Vec<ResponseComparison> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 11);
        assert_eq!(records.iter().filter(|r| r.status_match).count(), 1);
        assert_eq!(records[10].path, "/reports/last");
    }

    #[tokio::test]
    async fn test_memory_store_keeps_records() {
        let store = MemoryComparisonStore::new();

        store
            .append(&ResponseComparison::new("/reports/5", "GET", 200, 500, None))
            .await
            .unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].status_match);
    }
}
