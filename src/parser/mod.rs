//! Access log line parsing
//!
//! Log objects are self-describing: a `#Fields` directive names the
//! tab-separated columns of every data line that follows. [`RecordParser`]
//! keeps the schema for one object and turns lines into [`ParsedRecord`]s.
//!
//! ## Line kinds
//!
//! - Directive (`#...`): `#Fields` establishes the schema once, later ones and
//!   other directives are ignored.
//! - Single token (including blank lines): ignored.
//! - Anything else is a data line.
//!
//! Data lines that arrive before the schema are buffered and replayed once the
//! directive shows up. If the object ends first, [`RecordParser::finish`]
//! reports [`SchemaMissing`].

mod record;
mod schema;

use chrono::NaiveDate;
use thiserror::Error;

pub use record::{
    BYTES_FIELD, FieldValue, LogRecord, ParsedRecord, STATUS_FIELD, USER_AGENT_FIELD,
    parse_data_line,
};
pub use schema::{
    DIRECTIVE_MARKER, FIELDS_DIRECTIVE, FieldSchema, HUMAN_TIMESTAMP_FIELD, TIMESTAMP_FIELD,
    normalize_field_name,
};

/// Record-level failures; the rest of the object is unaffected
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("field '{field}' is not an integer: {value:?}")]
    FieldCoercion { field: String, value: String },

    #[error("invalid time of day: {0:?}")]
    InvalidTime(String),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("no #Fields directive before end of object ({buffered} data line(s) buffered)")]
pub struct SchemaMissing {
    pub buffered: usize,
}

#[derive(Debug)]
pub enum LineOutcome {
    Record(ParsedRecord),
    /// Schema established; carries the results for any buffered data lines
    SchemaUpdate {
        replayed: Vec<Result<ParsedRecord, ParseError>>,
    },
    /// Data line held until the schema is known
    Buffered,
    Ignored,
}

pub struct RecordParser {
    date: NaiveDate,
    schema: Option<FieldSchema>,
    pending: Vec<String>,
}

impl RecordParser {
    /// Parser for an object whose records belong to `date`
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            schema: None,
            pending: Vec::new(),
        }
    }

    pub fn schema(&self) -> Option<&FieldSchema> {
        self.schema.as_ref()
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn parse_line(&mut self, line: &str) -> Result<LineOutcome, ParseError> {
        if line.starts_with(DIRECTIVE_MARKER) {
            return Ok(self.directive(line));
        }

        if !line.contains('\t') {
            return Ok(LineOutcome::Ignored);
        }

        match &self.schema {
            Some(schema) => parse_data_line(line, self.date, schema).map(LineOutcome::Record),
            None => {
                self.pending.push(line.to_string());
                Ok(LineOutcome::Buffered)
            }
        }
    }

    /// Confirm the object produced a schema
    pub fn finish(&self) -> Result<&FieldSchema, SchemaMissing> {
        self.schema.as_ref().ok_or(SchemaMissing {
            buffered: self.pending.len(),
        })
    }

    fn directive(&mut self, line: &str) -> LineOutcome {
        if self.schema.is_some() {
            return LineOutcome::Ignored;
        }
        let Some(schema) = FieldSchema::from_directive(line) else {
            return LineOutcome::Ignored;
        };

        let replayed = std::mem::take(&mut self.pending)
            .iter()
            .map(|pending| parse_data_line(pending, self.date, &schema))
            .collect();
        self.schema = Some(schema);

        LineOutcome::SchemaUpdate { replayed }
    }
}
