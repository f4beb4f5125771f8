//! Day-bucketed record storage
//!
//! A [`BucketStore`] holds serialized records grouped by [`DayBucket`] and
//! ordered by sort key (event epoch seconds). The ingestion pipeline writes
//! one object's records as a single write group; export reads them back.
//!
//! ## Guarantees
//!
//! - `commit_batch` is atomic: all new entries of the batch land, or none do.
//! - An entry is identified by `(sort_key, payload)`. Committing an entry that
//!   is already present is a no-op, so replaying an object never duplicates.
//! - `record_count` is maintained inside the same write group, giving a stable
//!   per-date counter that concurrent workers can read.
//! - Once a bucket is sealed (materialized by export), batches that would add
//!   new entries are rejected with [`StoreError::BucketSealed`].
//!
//! Two implementations are provided: [`FjallBucketStore`] (durable, embedded
//! LSM keyspace) and [`MemoryBucketStore`] (tests and dry runs).

mod fjall_store;
mod keys;
mod memory;

pub use fjall_store::FjallBucketStore;
pub use memory::MemoryBucketStore;

use thiserror::Error;

use crate::bucket::DayBucket;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bucket {0} is sealed")]
    BucketSealed(DayBucket),

    #[error("record key too large for bucket {bucket}: {len} bytes")]
    KeyTooLarge { bucket: DayBucket, len: usize },

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether retrying the same write group could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Fjall(_) | StoreError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One record as stored: sort position plus serialized content
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketEntry {
    pub sort_key: i64,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Entries not previously present
    pub inserted: u64,
    /// Entries already stored, or repeated within the batch
    pub duplicates: u64,
}

pub trait BucketStore: Send + Sync {
    /// Atomically add `entries` to `bucket`, skipping ones already present
    fn commit_batch(&self, bucket: DayBucket, entries: &[BucketEntry]) -> Result<CommitStats>;

    /// Payloads of `bucket` in ascending sort-key order
    fn range_query(&self, bucket: DayBucket) -> Result<Vec<String>>;

    /// Distinct entries stored for `bucket`
    fn record_count(&self, bucket: DayBucket) -> Result<u64>;

    /// Every bucket holding at least one entry, ascending
    fn list_buckets(&self) -> Result<Vec<DayBucket>>;

    /// Mark `bucket` as materialized; it stops accepting new entries
    fn seal(&self, bucket: DayBucket) -> Result<()>;

    fn is_sealed(&self, bucket: DayBucket) -> Result<bool>;
}
