//! Flat-file materialization of day buckets
//!
//! Each bucket becomes `<out>/<date>/cloudfront/cf-access.log`, one
//! tab-separated line per record in sort-key order. A bucket whose
//! `<date>/cloudfront` directory already exists is left alone, and an exported
//! bucket is sealed so later ingestion cannot silently grow it.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::bucket::DayBucket;
use crate::parser::{
    BYTES_FIELD, HUMAN_TIMESTAMP_FIELD, LogRecord, STATUS_FIELD, TIMESTAMP_FIELD,
    USER_AGENT_FIELD,
};
use crate::store::{BucketStore, StoreError};

pub const SOURCE_TAG: &str = "aws.cloudfront";
pub const PLACEHOLDER: &str = "-";
pub const LOG_DIR_NAME: &str = "cloudfront";
pub const LOG_FILE_NAME: &str = "cf-access.log";

const STAGING_DIR_NAME: &str = ".cloudfront.partial";

enum Column {
    Field(&'static str),
    Literal(&'static str),
}

/// Output column order
const COLUMNS: [Column; 14] = [
    Column::Field(HUMAN_TIMESTAMP_FIELD),
    Column::Field(TIMESTAMP_FIELD),
    Column::Field("cs_Host"),
    Column::Field("x-edge-location"),
    Column::Literal(SOURCE_TAG),
    Column::Field("c-ip"),
    Column::Field("cs-method"),
    Column::Literal(PLACEHOLDER),
    Column::Field(STATUS_FIELD),
    Column::Field(BYTES_FIELD),
    Column::Field("cs-uri-stem"),
    Column::Field("cs-uri-query"),
    Column::Field("cs_Referer"),
    Column::Field(USER_AGENT_FIELD),
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("stored record in {bucket} is not valid JSON: {source}")]
    Decode {
        bucket: DayBucket,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written { path: PathBuf, records: u64 },
    /// The bucket's directory was already there
    Skipped { dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketExport {
    pub bucket: DayBucket,
    pub outcome: ExportOutcome,
}

/// `<out_dir>/<date>/cloudfront`
pub fn bucket_dir(out_dir: &Path, bucket: DayBucket) -> PathBuf {
    out_dir.join(bucket.to_string()).join(LOG_DIR_NAME)
}

/// One output line; absent fields become `-`, control characters are dropped
pub fn render_line(record: &LogRecord) -> String {
    let mut line = String::new();
    for (i, column) in COLUMNS.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        match column {
            Column::Literal(text) => line.push_str(text),
            Column::Field(name) => match record.get(name) {
                Some(value) => line.extend(value.to_string().chars().filter(|c| !c.is_control())),
                None => line.push_str(PLACEHOLDER),
            },
        }
    }
    line
}

/// Write one bucket to disk and seal it
pub fn export_day(store: &dyn BucketStore, bucket: DayBucket, out_dir: &Path) -> Result<ExportOutcome> {
    let dir = bucket_dir(out_dir, bucket);
    if dir.exists() {
        info!(date = %bucket, dir = %dir.display(), "Skipping existing log directory");
        return Ok(ExportOutcome::Skipped { dir });
    }

    // Sealed before reading so nothing lands after the snapshot
    store.seal(bucket)?;
    let payloads = store.range_query(bucket)?;
    info!(date = %bucket, records = payloads.len(), "Generating logfile");

    let date_dir = out_dir.join(bucket.to_string());
    let staging = date_dir.join(STAGING_DIR_NAME);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let mut writer = BufWriter::new(File::create(staging.join(LOG_FILE_NAME))?);
    for payload in &payloads {
        let record = LogRecord::from_json(payload)
            .map_err(|source| ExportError::Decode { bucket, source })?;
        writeln!(writer, "{}", render_line(&record))?;
    }
    writer.flush()?;
    drop(writer);

    fs::rename(&staging, &dir)?;
    let path = dir.join(LOG_FILE_NAME);
    info!(date = %bucket, path = %path.display(), "Finished dumping log data");

    Ok(ExportOutcome::Written {
        path,
        records: payloads.len() as u64,
    })
}

/// Export every stored bucket in date order, leaving out `today` unless asked
pub fn export_all(
    store: &dyn BucketStore,
    out_dir: &Path,
    include_today: bool,
    today: DayBucket,
) -> Result<Vec<BucketExport>> {
    let buckets = store.list_buckets()?;
    info!(buckets = buckets.len(), "Found available logs");

    let mut exports = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        if bucket == today && !include_today {
            debug!(date = %bucket, "Leaving today's bucket open");
            continue;
        }
        let outcome = export_day(store, bucket, out_dir)?;
        exports.push(BucketExport { bucket, outcome });
    }

    Ok(exports)
}
