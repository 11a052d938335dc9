pub mod disk;
pub mod memory;

use anyhow::{Context, Result};
use disk::{FjallBlobStore, FjallHistoryBackend};
use fjall::{Keyspace, PartitionCreateOptions};
use std::path::Path;
use tracing::debug;

const SECRETS_PARTITION: &str = "secrets";
const HISTORY_PARTITION: &str = "history";

/// The on-disk keyspace holding encrypted credentials and balance history.
pub struct Database {
    keyspace: Keyspace,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path.join("db"))
            .open()
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        debug!("Opened database at {}", path.display());
        Ok(Self { keyspace })
    }

    pub fn blob_store(&self) -> Result<FjallBlobStore> {
        let partition = self
            .keyspace
            .open_partition(SECRETS_PARTITION, PartitionCreateOptions::default())
            .context("Failed to open secrets partition")?;
        Ok(FjallBlobStore::new(self.keyspace.clone(), partition))
    }

    pub fn history_backend(&self) -> Result<FjallHistoryBackend> {
        let partition = self
            .keyspace
            .open_partition(HISTORY_PARTITION, PartitionCreateOptions::default())
            .context("Failed to open history partition")?;
        Ok(FjallHistoryBackend::new(self.keyspace.clone(), partition))
    }
}
