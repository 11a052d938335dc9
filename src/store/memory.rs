use crate::core::credentials::BlobStore;
use crate::core::history::{BalanceSnapshot, HistoryBackend};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// In-memory blob storage, lost on drop.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut blobs = self.inner.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(key.to_string(), value.to_vec());
        debug!("Memory PUT for key: {key}");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut blobs = self.inner.write().unwrap_or_else(|e| e.into_inner());
        blobs.remove(key);
        debug!("Memory REMOVE for key: {key}");
        Ok(())
    }
}

/// In-memory snapshot log, in append order.
#[derive(Default)]
pub struct MemoryHistoryBackend {
    inner: RwLock<Vec<BalanceSnapshot>>,
}

impl MemoryHistoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryBackend for MemoryHistoryBackend {
    fn append(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        let mut log = self.inner.write().unwrap_or_else(|e| e.into_inner());
        log.push(snapshot.clone());
        Ok(())
    }

    fn since(&self, from: Option<DateTime<Utc>>) -> Result<Vec<BalanceSnapshot>> {
        let log = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(log
            .iter()
            .filter(|s| from.is_none_or(|from| s.timestamp >= from))
            .cloned()
            .collect())
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut log = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let before = log.len();
        log.retain(|s| s.timestamp >= cutoff);
        Ok(before - log.len())
    }
}
