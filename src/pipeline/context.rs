//! Per-run aggregation state

use tracing::{info, warn};

use super::ObjectReport;
use crate::bucket::DayBucket;
use crate::error::IngestError;
use crate::observability::MetricsSnapshot;
use crate::store::BucketStore;

/// The run moved on from `completed` to another date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBoundary {
    pub completed: DayBucket,
    /// Store counter for `completed` at the time of the event
    pub records: Option<u64>,
    /// `None` for the event emitted when the run finishes
    pub next: Option<DayBucket>,
}

#[derive(Debug)]
pub struct ObjectFailure {
    pub key: String,
    pub bucket: Option<DayBucket>,
    pub error: IngestError,
}

#[derive(Debug)]
pub struct RunSummary {
    pub objects: usize,
    pub metrics: MetricsSnapshot,
    pub boundaries: Vec<DayBoundary>,
    pub reports: Vec<ObjectReport>,
    pub failures: Vec<ObjectFailure>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// State owned by one `run`, dropped with it.
///
/// Results are folded in listing order. Boundary counts come from the store,
/// so they stay right when objects of one date are split across workers or
/// arrive out of order.
#[derive(Debug, Default)]
pub struct RunContext {
    current: Option<DayBucket>,
    boundaries: Vec<DayBoundary>,
    reports: Vec<ObjectReport>,
    failures: Vec<ObjectFailure>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note the next object's date, emitting a boundary if it changed
    pub fn observe_bucket(&mut self, bucket: DayBucket, store: &dyn BucketStore) {
        match self.current {
            Some(previous) if previous != bucket => {
                self.emit_boundary(previous, Some(bucket), store);
            }
            Some(_) => {}
            None => info!(date = %bucket, "Starting entries for date"),
        }
        self.current = Some(bucket);
    }

    pub fn record_success(&mut self, report: ObjectReport) {
        self.reports.push(report);
    }

    pub fn record_failure(&mut self, failure: ObjectFailure) {
        self.failures.push(failure);
    }

    pub fn boundaries(&self) -> &[DayBoundary] {
        &self.boundaries
    }

    /// Close the last open date and produce the summary
    pub fn finish(
        mut self,
        objects: usize,
        metrics: MetricsSnapshot,
        store: &dyn BucketStore,
    ) -> RunSummary {
        if let Some(last) = self.current.take() {
            self.emit_boundary(last, None, store);
        }

        RunSummary {
            objects,
            metrics,
            boundaries: self.boundaries,
            reports: self.reports,
            failures: self.failures,
        }
    }

    fn emit_boundary(
        &mut self,
        completed: DayBucket,
        next: Option<DayBucket>,
        store: &dyn BucketStore,
    ) {
        let records = match store.record_count(completed) {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(date = %completed, error = %e, "Could not read record count");
                None
            }
        };

        info!(date = %completed, records = ?records, "Completed entries for date");
        self.boundaries.push(DayBoundary {
            completed,
            records,
            next,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BucketEntry, MemoryBucketStore};

    fn day(d: u32) -> DayBucket {
        DayBucket::from_ymd(2023, 5, d).unwrap()
    }

    fn commit(store: &MemoryBucketStore, bucket: DayBucket, keys: &[i64]) {
        let entries: Vec<BucketEntry> = keys
            .iter()
            .map(|&sort_key| BucketEntry {
                sort_key,
                payload: format!("r{sort_key}"),
            })
            .collect();
        store.commit_batch(bucket, &entries).unwrap();
    }

    #[test]
    fn test_boundary_on_date_change() {
        let store = MemoryBucketStore::new();
        let mut ctx = RunContext::new();

        commit(&store, day(1), &[1, 2]);
        ctx.observe_bucket(day(1), &store);
        ctx.observe_bucket(day(1), &store);
        assert!(ctx.boundaries().is_empty());

        commit(&store, day(2), &[3]);
        ctx.observe_bucket(day(2), &store);
        assert_eq!(
            ctx.boundaries(),
            [DayBoundary {
                completed: day(1),
                records: Some(2),
                next: Some(day(2)),
            }]
        );

        let summary = ctx.finish(3, MetricsSnapshot::default(), &store);
        assert_eq!(summary.boundaries.len(), 2);
        assert_eq!(summary.boundaries[1].completed, day(2));
        assert_eq!(summary.boundaries[1].records, Some(1));
        assert_eq!(summary.boundaries[1].next, None);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_empty_run_has_no_boundaries() {
        let store = MemoryBucketStore::new();
        let summary = RunContext::new().finish(0, MetricsSnapshot::default(), &store);
        assert!(summary.boundaries.is_empty());
    }

    #[test]
    fn test_interleaved_dates_report_store_totals() {
        let store = MemoryBucketStore::new();
        let mut ctx = RunContext::new();

        commit(&store, day(1), &[1]);
        ctx.observe_bucket(day(1), &store);
        commit(&store, day(2), &[5]);
        ctx.observe_bucket(day(2), &store);
        commit(&store, day(1), &[2, 3]);
        ctx.observe_bucket(day(1), &store);

        let summary = ctx.finish(3, MetricsSnapshot::default(), &store);
        let last = summary.boundaries.last().unwrap();
        assert_eq!(last.completed, day(1));
        assert_eq!(last.records, Some(3));
    }
}
