//! Object ingestion: inflate, split, parse, commit
//!
//! Each object is decoded by a [`StreamInflater`] feeding a [`LineSplitter`]
//! feeding a [`RecordParser`]. All records of one object go to the store as a
//! single write group under the object's [`DayBucket`], so an object is either
//! fully committed or not at all. The source object is deleted only after that
//! write group succeeded.
//!
//! Objects are independent; [`IngestionPipeline::run`] processes up to
//! `workers` of them at once and folds results back in listing order.

mod context;
mod retry;

pub use context::{DayBoundary, ObjectFailure, RunContext, RunSummary};
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use tracing::{debug, error, info, warn};

use crate::bucket::DayBucket;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::inflate::{InflateError, InflatePhase, StreamInflater};
use crate::lines::{LineHandler, LineSplitter};
use crate::observability::IngestMetrics;
use crate::parser::{LineOutcome, ParseError, ParsedRecord, RecordParser};
use crate::source::{ObjectRef, ObjectSource, SourceError};
use crate::store::{BucketEntry, BucketStore, CommitStats, StoreError};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Objects processed concurrently
    pub workers: usize,
    /// Remove source objects once committed
    pub delete_after: bool,
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            delete_after: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&IngestConfig> for PipelineOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            delete_after: config.delete_after,
            retry: RetryPolicy::new(
                config.commit_attempts,
                Duration::from_millis(config.commit_backoff_ms),
            ),
        }
    }
}

/// Outcome of one successfully ingested object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReport {
    pub key: String,
    pub bucket: DayBucket,
    pub lines: u64,
    /// Records that parsed and were submitted
    pub records: u64,
    /// Records dropped by coercion or time errors
    pub rejected: u64,
    pub inserted: u64,
    pub duplicates: u64,
    /// Commit attempts used; 0 when there was nothing to commit
    pub attempts: u32,
    pub deleted: bool,
}

/// Line handler turning one object's lines into store entries
struct RecordCollector {
    key: String,
    parser: RecordParser,
    entries: Vec<BucketEntry>,
    rejected: u64,
}

impl RecordCollector {
    fn new(key: &str, bucket: DayBucket) -> Self {
        Self {
            key: key.to_string(),
            parser: RecordParser::new(bucket.date()),
            entries: Vec::new(),
            rejected: 0,
        }
    }

    fn accept(&mut self, parsed: std::result::Result<ParsedRecord, ParseError>) {
        match parsed.and_then(ParsedRecord::into_entry) {
            Ok(entry) => self.entries.push(entry),
            Err(e) => {
                self.rejected += 1;
                warn!(key = %self.key, error = %e, "Skipping record");
            }
        }
    }
}

impl LineHandler for RecordCollector {
    fn handle_line(&mut self, line: &str) {
        match self.parser.parse_line(line) {
            Ok(LineOutcome::Record(parsed)) => self.accept(Ok(parsed)),
            Ok(LineOutcome::SchemaUpdate { replayed }) => {
                debug!(key = %self.key, replayed = replayed.len(), "Schema established");
                for parsed in replayed {
                    self.accept(parsed);
                }
            }
            Ok(LineOutcome::Buffered | LineOutcome::Ignored) => {}
            Err(e) => self.accept(Err(e)),
        }
    }
}

/// Everything decoded from one object, ready to commit
struct DecodedObject {
    entries: Vec<BucketEntry>,
    lines: u64,
    rejected: u64,
}

/// Per-object decoding chain
struct ObjectDecoder {
    inflater: StreamInflater<LineSplitter<RecordCollector>>,
}

impl ObjectDecoder {
    fn new(key: &str, bucket: DayBucket) -> Self {
        Self {
            inflater: StreamInflater::new(LineSplitter::new(RecordCollector::new(key, bucket))),
        }
    }

    fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.inflater.feed(chunk)?;
        Ok(())
    }

    /// Succeeds only when the stream drained and a schema was seen
    fn finish(mut self) -> Result<DecodedObject> {
        self.inflater.close()?;
        match self.inflater.phase() {
            InflatePhase::Drained => {}
            InflatePhase::AwaitingHeader => {
                return Err(InflateError::TruncatedHeader {
                    buffered: self.inflater.buffered(),
                }
                .into());
            }
            InflatePhase::StreamingPayload => return Err(InflateError::TruncatedPayload.into()),
        }

        let splitter = self.inflater.into_sink();
        let lines = splitter.lines();
        let collector = splitter.into_handler();
        collector.parser.finish()?;

        Ok(DecodedObject {
            entries: collector.entries,
            lines,
            rejected: collector.rejected,
        })
    }
}

pub struct IngestionPipeline {
    source: Arc<dyn ObjectSource>,
    store: Arc<dyn BucketStore>,
    options: PipelineOptions,
}

impl IngestionPipeline {
    pub fn new(
        source: Arc<dyn ObjectSource>,
        store: Arc<dyn BucketStore>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    /// Decode a complete object and commit its records to `source_date`
    pub async fn ingest_object(
        &self,
        key: &str,
        bytes: &[u8],
        source_date: DayBucket,
    ) -> Result<ObjectReport> {
        let mut decoder = ObjectDecoder::new(key, source_date);
        decoder.feed(bytes)?;
        let decoded = decoder.finish()?;
        self.commit_decoded(key, source_date, decoded).await
    }

    /// Same as [`Self::ingest_object`], fed chunk by chunk
    pub async fn ingest_stream<S>(
        &self,
        key: &str,
        source_date: DayBucket,
        mut chunks: S,
    ) -> Result<ObjectReport>
    where
        S: Stream<Item = std::result::Result<Bytes, SourceError>> + Unpin,
    {
        let mut decoder = ObjectDecoder::new(key, source_date);
        while let Some(chunk) = chunks.try_next().await? {
            decoder.feed(&chunk)?;
        }
        let decoded = decoder.finish()?;
        self.commit_decoded(key, source_date, decoded).await
    }

    /// Fetch, ingest and (optionally) delete one listed object
    pub async fn process(&self, object: &ObjectRef) -> Result<ObjectReport> {
        let bucket = object
            .date_hint
            .ok_or_else(|| IngestError::InvalidObjectKey(object.key.clone()))?;

        let chunks = self.source.fetch_stream(&object.key).await?;
        let mut report = self.ingest_stream(&object.key, bucket, chunks).await?;

        if self.options.delete_after {
            self.source.delete(&object.key).await?;
            report.deleted = true;
        }
        Ok(report)
    }

    /// Ingest every object under `prefix`.
    ///
    /// Only a failed listing aborts the run; object failures are collected in
    /// the summary and those objects stay in the source.
    pub async fn run(&self, prefix: &str) -> std::result::Result<RunSummary, SourceError> {
        let objects = self.source.list_objects(prefix).await?;
        let total = objects.len();
        info!(prefix, objects = total, workers = self.options.workers, "Starting ingestion run");

        let metrics = IngestMetrics::new();
        let mut ctx = RunContext::new();

        let mut results = stream::iter(objects)
            .map(|object| async move {
                let outcome = self.process(&object).await;
                (object, outcome)
            })
            .buffered(self.options.workers.max(1));

        while let Some((object, outcome)) = results.next().await {
            if let Some(bucket) = object.date_hint {
                ctx.observe_bucket(bucket, self.store.as_ref());
            }

            match outcome {
                Ok(report) => {
                    metrics.object_ingested();
                    metrics.records_committed(report.inserted, report.duplicates);
                    metrics.records_rejected(report.rejected);
                    for _ in 1..report.attempts {
                        metrics.commit_retried();
                    }
                    if report.deleted {
                        metrics.object_deleted();
                    }
                    ctx.record_success(report);
                }
                Err(e) => {
                    metrics.object_failed();
                    error!(key = %object.key, error = %e, "Object ingestion failed, leaving it in place");
                    ctx.record_failure(ObjectFailure {
                        key: object.key,
                        bucket: object.date_hint,
                        error: e,
                    });
                }
            }
        }

        let summary = ctx.finish(total, metrics.snapshot(), self.store.as_ref());
        info!(
            objects = summary.objects,
            failed = summary.failures.len(),
            records = summary.metrics.records_committed,
            "Ingestion run finished"
        );
        Ok(summary)
    }

    async fn commit_decoded(
        &self,
        key: &str,
        bucket: DayBucket,
        decoded: DecodedObject,
    ) -> Result<ObjectReport> {
        let records = decoded.entries.len() as u64;
        let (stats, attempts) = if decoded.entries.is_empty() {
            debug!(key, date = %bucket, "Object has no records to commit");
            (CommitStats::default(), 0)
        } else {
            self.commit_with_retry(key, bucket, decoded.entries).await?
        };

        info!(
            key,
            date = %bucket,
            lines = decoded.lines,
            records,
            rejected = decoded.rejected,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            "Ingested object"
        );

        Ok(ObjectReport {
            key: key.to_string(),
            bucket,
            lines: decoded.lines,
            records,
            rejected: decoded.rejected,
            inserted: stats.inserted,
            duplicates: stats.duplicates,
            attempts,
            deleted: false,
        })
    }

    /// Commit the object's write group, backing off between attempts
    async fn commit_with_retry(
        &self,
        key: &str,
        bucket: DayBucket,
        entries: Vec<BucketEntry>,
    ) -> Result<(CommitStats, u32)> {
        let entries: Arc<[BucketEntry]> = entries.into();
        let policy = self.options.retry;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let store = Arc::clone(&self.store);
            let batch = Arc::clone(&entries);
            let result = tokio::task::spawn_blocking(move || store.commit_batch(bucket, &batch))
                .await
                .unwrap_or_else(|e| {
                    Err(StoreError::Io(std::io::Error::other(format!(
                        "commit task failed: {e}"
                    ))))
                });

            match result {
                Ok(stats) => {
                    if attempts > 1 {
                        debug!(key, attempts, "Commit succeeded after retry");
                    }
                    return Ok((stats, attempts));
                }
                Err(e) if e.is_retryable() && policy.should_retry(attempts) => {
                    let backoff = policy.backoff(attempts);
                    warn!(key, attempts, error = %e, backoff_ms = backoff.as_millis() as u64, "Commit failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(key, attempts, error = %e, "Commit failed");
                    return Err(IngestError::StoreCommit {
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }
}
