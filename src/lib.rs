pub mod bucket;
pub mod config;
pub mod error;
pub mod export;
pub mod humanize;
pub mod inflate;
pub mod lines;
pub mod observability;
pub mod parser;
pub mod pipeline;
pub mod source;
pub mod store;

pub use bucket::DayBucket;
pub use error::IngestError;
pub use inflate::{ByteSink, StreamInflater};
pub use parser::{FieldSchema, LogRecord, RecordParser};
pub use pipeline::{IngestionPipeline, PipelineOptions, RunSummary};
pub use store::{BucketStore, FjallBucketStore, MemoryBucketStore};
