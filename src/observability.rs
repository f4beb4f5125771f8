//! Observability (tracing setup, ingest counters)

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Counters shared by every worker of one run
#[derive(Debug, Default)]
pub struct IngestMetrics {
    objects_ingested: AtomicU64,
    objects_failed: AtomicU64,
    objects_deleted: AtomicU64,
    records_committed: AtomicU64,
    records_duplicate: AtomicU64,
    records_rejected: AtomicU64,
    commit_retries: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_ingested(&self) {
        self.objects_ingested.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "objects_ingested", "Metric incremented");
    }

    pub fn object_failed(&self) {
        self.objects_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "objects_failed", "Metric incremented");
    }

    pub fn object_deleted(&self) {
        self.objects_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_committed(&self, inserted: u64, duplicates: u64) {
        self.records_committed.fetch_add(inserted, Ordering::Relaxed);
        self.records_duplicate.fetch_add(duplicates, Ordering::Relaxed);
        tracing::debug!(counter = "records_committed", inserted, duplicates, "Metric incremented");
    }

    pub fn records_rejected(&self, count: u64) {
        self.records_rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn commit_retried(&self) {
        self.commit_retries.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "commit_retries", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            objects_ingested: self.objects_ingested.load(Ordering::Relaxed),
            objects_failed: self.objects_failed.load(Ordering::Relaxed),
            objects_deleted: self.objects_deleted.load(Ordering::Relaxed),
            records_committed: self.records_committed.load(Ordering::Relaxed),
            records_duplicate: self.records_duplicate.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            commit_retries: self.commit_retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub objects_ingested: u64,
    pub objects_failed: u64,
    pub objects_deleted: u64,
    pub records_committed: u64,
    pub records_duplicate: u64,
    pub records_rejected: u64,
    pub commit_retries: u64,
}
