use crate::core::credentials::BlobStore;
use crate::core::history::{BalanceSnapshot, HistoryBackend, HistoryRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionHandle, PersistMode};
use tracing::{debug, warn};

/// Blob storage in a fjall partition. Each write is flushed before returning.
pub struct FjallBlobStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallBlobStore {
    pub fn new(keyspace: Keyspace, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }
}

impl BlobStore for FjallBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.partition.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.partition.insert(key, value)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Stored blob {key}");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.partition.remove(key)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Removed blob {key}");
        Ok(())
    }
}

/// Snapshots keyed by big-endian epoch milliseconds, so key order is time order.
pub struct FjallHistoryBackend {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallHistoryBackend {
    pub fn new(keyspace: Keyspace, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }

    fn key_for(ts: DateTime<Utc>) -> [u8; 8] {
        (ts.timestamp_millis().max(0) as u64).to_be_bytes()
    }
}

impl HistoryBackend for FjallHistoryBackend {
    fn append(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        let value = serde_json::to_vec(&HistoryRecord::from(snapshot))
            .context("Failed to serialize snapshot")?;

        // Records stamped within the same millisecond take the next free key.
        let mut key = u64::from_be_bytes(Self::key_for(snapshot.timestamp));
        while self.partition.get(key.to_be_bytes())?.is_some() {
            key += 1;
        }
        self.partition.insert(&key.to_be_bytes()[..], value)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn since(&self, from: Option<DateTime<Utc>>) -> Result<Vec<BalanceSnapshot>> {
        let start = from.map_or([0u8; 8], Self::key_for);
        let mut snapshots = Vec::new();
        for item in self.partition.range(start..) {
            let (key, value) = item?;
            match serde_json::from_slice::<HistoryRecord>(&value) {
                Ok(record) => snapshots.push(record.into()),
                Err(e) => warn!("Skipping unreadable history record {key:?}: {e}"),
            }
        }
        Ok(snapshots)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let end = Self::key_for(cutoff);
        let keys = self
            .partition
            .range(..end)
            .map(|item| item.map(|(key, _)| key))
            .collect::<Result<Vec<_>, _>>()?;
        for key in &keys {
            self.partition.remove(key.clone())?;
        }
        if !keys.is_empty() {
            self.keyspace.persist(PersistMode::SyncAll)?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn snapshot(ts: DateTime<Utc>, total: rust_decimal::Decimal) -> BalanceSnapshot {
        let mut per_exchange = BTreeMap::new();
        per_exchange.insert("Binance".to_string(), total);
        BalanceSnapshot {
            timestamp: ts,
            total_usd: total,
            per_exchange,
        }
    }

    #[test]
    fn test_blob_put_get_remove() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let blobs = db.blob_store().unwrap();

        assert!(blobs.get("k").unwrap().is_none());
        blobs.put("k", b"first").unwrap();
        blobs.put("k", b"second").unwrap();
        assert_eq!(blobs.get("k").unwrap(), Some(b"second".to_vec()));
        blobs.remove("k").unwrap();
        assert!(blobs.get("k").unwrap().is_none());
    }

    #[test]
    fn test_blob_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.blob_store().unwrap().put("k", b"value").unwrap();
        }
        let db = Database::open(dir.path()).unwrap();
        assert_eq!(
            db.blob_store().unwrap().get("k").unwrap(),
            Some(b"value".to_vec())
        );
    }

    #[test]
    fn test_history_append_and_range() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let history = db.history_backend().unwrap();
        let t = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();

        history.append(&snapshot(t - Duration::days(2), dec!(10))).unwrap();
        history.append(&snapshot(t, dec!(20))).unwrap();
        // Same millisecond does not overwrite
        history.append(&snapshot(t, dec!(30))).unwrap();

        let all = history.since(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].per_exchange["Binance"], dec!(10));

        let recent = history.since(Some(t - Duration::days(1))).unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_keys_are_big_endian_millis() {
        let t = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        let key = FjallHistoryBackend::key_for(t);
        assert_eq!(u64::from_be_bytes(key), t.timestamp_millis() as u64);
        assert!(key < FjallHistoryBackend::key_for(t + Duration::milliseconds(1)));
        assert!(FjallHistoryBackend::key_for(t - Duration::days(400)) < key);
    }

    #[test]
    fn test_history_prune() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let history = db.history_backend().unwrap();
        let t = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();

        history.append(&snapshot(t - Duration::days(5), dec!(1))).unwrap();
        history.append(&snapshot(t - Duration::days(4), dec!(2))).unwrap();
        history.append(&snapshot(t, dec!(3))).unwrap();

        assert_eq!(history.prune_before(t - Duration::days(1)).unwrap(), 2);
        let left = history.since(None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].total_usd, dec!(3));
    }
}
