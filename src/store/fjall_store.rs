use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::keys::{
    MAX_KEY_LEN, decode_count_key, decode_record_key, encode_count_key, encode_record_key,
    encode_record_prefix, encode_sealed_key,
};
use super::{BucketEntry, BucketStore, CommitStats, Result, StoreError};
use crate::bucket::DayBucket;

/// Fjall-backed persistent storage for day buckets
pub struct FjallBucketStore {
    keyspace: Keyspace,
    records: PartitionHandle,
    counts: PartitionHandle,
    metadata: PartitionHandle,
    /// Serializes write groups so count updates never race
    write_lock: Mutex<()>,
}

impl FjallBucketStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_cache(path, None)
    }

    /// Open with an explicit block cache size in bytes
    pub fn open_with_cache<P: AsRef<Path>>(path: P, cache_size: Option<u64>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening bucket store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut config = Config::new(path);
        if let Some(bytes) = cache_size {
            config = config.cache_size(bytes);
        }
        let keyspace = config.open()?;

        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let counts = keyspace.open_partition("counts", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("Bucket store opened successfully");
        Ok(Self {
            keyspace,
            records,
            counts,
            metadata,
            write_lock: Mutex::new(()),
        })
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn read_count(&self, bucket: DayBucket) -> Result<u64> {
        match self.counts.get(encode_count_key(bucket))? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    StoreError::InvalidKey(format!("count for {} is {} bytes", bucket, bytes.len()))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }
}

impl BucketStore for FjallBucketStore {
    fn commit_batch(&self, bucket: DayBucket, entries: &[BucketEntry]) -> Result<CommitStats> {
        let keys: BTreeSet<Vec<u8>> = entries
            .iter()
            .map(|entry| encode_record_key(bucket, entry.sort_key, &entry.payload))
            .collect();
        if let Some(key) = keys.iter().find(|key| key.len() > MAX_KEY_LEN) {
            return Err(StoreError::KeyTooLarge {
                bucket,
                len: key.len(),
            });
        }

        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut fresh = Vec::with_capacity(keys.len());
        for key in keys {
            if !self.records.contains_key(&key)? {
                fresh.push(key);
            }
        }

        let stats = CommitStats {
            inserted: fresh.len() as u64,
            duplicates: (entries.len() - fresh.len()) as u64,
        };
        if fresh.is_empty() {
            debug!(%bucket, duplicates = stats.duplicates, "Nothing new to commit");
            return Ok(stats);
        }

        if self.is_sealed(bucket)? {
            return Err(StoreError::BucketSealed(bucket));
        }

        let count = self.read_count(bucket)? + stats.inserted;
        let mut batch = self.keyspace.batch();
        for key in &fresh {
            batch.insert(&self.records, key.as_slice(), b"".as_slice());
        }
        batch.insert(&self.counts, encode_count_key(bucket), count.to_be_bytes());
        batch.commit()?;

        debug!(%bucket, inserted = stats.inserted, duplicates = stats.duplicates, total = count, "Committed write group");
        Ok(stats)
    }

    fn range_query(&self, bucket: DayBucket) -> Result<Vec<String>> {
        let mut payloads = Vec::new();
        for item in self.records.prefix(encode_record_prefix(bucket)) {
            let (key, _) = item?;
            let (_, _, payload) = decode_record_key(&key)
                .ok_or_else(|| StoreError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?;
            payloads.push(payload);
        }
        Ok(payloads)
    }

    fn record_count(&self, bucket: DayBucket) -> Result<u64> {
        self.read_count(bucket)
    }

    fn list_buckets(&self) -> Result<Vec<DayBucket>> {
        let mut buckets = Vec::new();
        for item in self.counts.iter() {
            let (key, _) = item?;
            let bucket = decode_count_key(&key)
                .ok_or_else(|| StoreError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?;
            buckets.push(bucket);
        }
        Ok(buckets)
    }

    fn seal(&self, bucket: DayBucket) -> Result<()> {
        // Waits out any write group that already passed its sealed check
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.metadata
            .insert(encode_sealed_key(bucket), now.to_string().as_bytes())?;
        info!(%bucket, "Bucket sealed");
        Ok(())
    }

    fn is_sealed(&self, bucket: DayBucket) -> Result<bool> {
        Ok(self.metadata.contains_key(encode_sealed_key(bucket))?)
    }
}
