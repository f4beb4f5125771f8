use thiserror::Error;

use crate::inflate::InflateError;
use crate::parser::SchemaMissing;
use crate::source::SourceError;
use crate::store::StoreError;

/// Why one object failed to ingest. The object is never deleted.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed stream: {0}")]
    MalformedStream(#[from] InflateError),

    #[error("no schema directive ({buffered_lines} data line(s) unparsed)")]
    SchemaMissing { buffered_lines: usize },

    #[error("store commit failed after {attempts} attempt(s): {source}")]
    StoreCommit {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("object key carries no date: {0}")]
    InvalidObjectKey(String),
}

impl From<SchemaMissing> for IngestError {
    fn from(err: SchemaMissing) -> Self {
        IngestError::SchemaMissing {
            buffered_lines: err.buffered,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
