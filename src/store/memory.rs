use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::{BucketEntry, BucketStore, CommitStats, Result, StoreError};
use crate::bucket::DayBucket;

#[derive(Default)]
struct Buckets {
    entries: BTreeMap<DayBucket, BTreeSet<BucketEntry>>,
    sealed: BTreeSet<DayBucket>,
}

/// In-process bucket store with the same semantics as the durable one
#[derive(Default)]
pub struct MemoryBucketStore {
    inner: Mutex<Buckets>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Buckets>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl BucketStore for MemoryBucketStore {
    fn commit_batch(&self, bucket: DayBucket, entries: &[BucketEntry]) -> Result<CommitStats> {
        let mut inner = self.lock()?;
        let existing = inner.entries.get(&bucket);

        let fresh: BTreeSet<&BucketEntry> = entries
            .iter()
            .filter(|entry| existing.is_none_or(|set| !set.contains(*entry)))
            .collect();
        let stats = CommitStats {
            inserted: fresh.len() as u64,
            duplicates: (entries.len() - fresh.len()) as u64,
        };
        if fresh.is_empty() {
            return Ok(stats);
        }
        if inner.sealed.contains(&bucket) {
            return Err(StoreError::BucketSealed(bucket));
        }

        let fresh: Vec<BucketEntry> = fresh.into_iter().cloned().collect();
        inner.entries.entry(bucket).or_default().extend(fresh);
        Ok(stats)
    }

    fn range_query(&self, bucket: DayBucket) -> Result<Vec<String>> {
        let inner = self.lock()?;
        Ok(inner
            .entries
            .get(&bucket)
            .map(|set| set.iter().map(|entry| entry.payload.clone()).collect())
            .unwrap_or_default())
    }

    fn record_count(&self, bucket: DayBucket) -> Result<u64> {
        let inner = self.lock()?;
        Ok(inner.entries.get(&bucket).map_or(0, |set| set.len() as u64))
    }

    fn list_buckets(&self) -> Result<Vec<DayBucket>> {
        Ok(self.lock()?.entries.keys().copied().collect())
    }

    fn seal(&self, bucket: DayBucket) -> Result<()> {
        self.lock()?.sealed.insert(bucket);
        Ok(())
    }

    fn is_sealed(&self, bucket: DayBucket) -> Result<bool> {
        Ok(self.lock()?.sealed.contains(&bucket))
    }
}
