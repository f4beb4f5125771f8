//! Typed log records and data-line decoding

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::ParseError;
use super::schema::{FieldSchema, TIMESTAMP_FIELD};
use crate::store::BucketEntry;

pub const STATUS_FIELD: &str = "sc-status";
pub const BYTES_FIELD: &str = "sc-bytes";
pub const USER_AGENT_FIELD: &str = "cs_User-Agent";

/// Fields coerced to integers after zipping with the schema
const INTEGER_FIELDS: [&str; 3] = [STATUS_FIELD, BYTES_FIELD, TIMESTAMP_FIELD];

const HUMAN_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Field name to value mapping for one access log line.
///
/// Serializes as a JSON object with keys in sorted order, so identical records
/// always produce identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl LogRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_int)
    }

    /// Event epoch seconds
    pub fn timestamp(&self) -> Option<i64> {
        self.int(TIMESTAMP_FIELD)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// A decoded data line and the epoch second it sorts by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub record: LogRecord,
    pub sort_key: i64,
}

impl ParsedRecord {
    pub fn into_entry(self) -> Result<BucketEntry, ParseError> {
        Ok(BucketEntry {
            sort_key: self.sort_key,
            payload: self.record.to_json()?,
        })
    }
}

/// Decode one tab-separated data line.
///
/// The line's own date column is discarded: the event time is the object's
/// `date` plus the line's time of day, read as UTC. Values are paired with the
/// schema positionally, so surplus values and surplus fields are dropped.
pub fn parse_data_line(
    line: &str,
    date: NaiveDate,
    schema: &FieldSchema,
) -> Result<ParsedRecord, ParseError> {
    let mut tokens = line.split('\t');
    let _date = tokens.next();
    let time_of_day = tokens.next().unwrap_or_default();

    let time = NaiveTime::parse_from_str(time_of_day, "%H:%M:%S")
        .map_err(|_| ParseError::InvalidTime(time_of_day.to_string()))?;
    let event = date.and_time(time);
    let sort_key = event.and_utc().timestamp();

    let values = [
        FieldValue::Text(event.format(HUMAN_TIMESTAMP_FORMAT).to_string()),
        FieldValue::Int(sort_key),
    ]
    .into_iter()
    .chain(tokens.map(|token| FieldValue::Text(token.to_string())));

    let mut record = LogRecord::default();
    for (name, value) in schema.fields().iter().zip(values) {
        record.insert(name.clone(), value);
    }

    coerce_integers(&mut record)?;
    decode_user_agent(&mut record);

    Ok(ParsedRecord { record, sort_key })
}

fn coerce_integers(record: &mut LogRecord) -> Result<(), ParseError> {
    for field in INTEGER_FIELDS {
        let Some(FieldValue::Text(raw)) = record.fields.get(field) else {
            continue;
        };
        let value = raw.trim().parse::<i64>().map_err(|_| ParseError::FieldCoercion {
            field: field.to_string(),
            value: raw.clone(),
        })?;
        record.insert(field, FieldValue::Int(value));
    }
    Ok(())
}

/// `+` is a space, then `%XX` escapes; invalid UTF-8 is replaced
fn decode_user_agent(record: &mut LogRecord) {
    if let Some(FieldValue::Text(raw)) = record.fields.get_mut(USER_AGENT_FIELD) {
        let spaced = raw.replace('+', " ");
        let decoded = urlencoding::decode_binary(spaced.as_bytes());
        *raw = String::from_utf8_lossy(&decoded).into_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, 1).unwrap()
    }

    fn schema(line: &str) -> FieldSchema {
        FieldSchema::from_directive(line).unwrap()
    }

    #[test]
    fn test_minimal_scenario() {
        let schema = schema("#Fields date(UTC) time x-edge-location sc-bytes");
        let parsed = parse_data_line("2023-05-01\t00:00:05\tFRA50\t512", date(), &schema).unwrap();

        assert_eq!(parsed.sort_key, 1_682_899_205);
        assert_eq!(parsed.record.timestamp(), Some(1_682_899_205));
        assert_eq!(parsed.record.text("humantstamp"), Some("2023-05-01T00:00:05"));
        assert_eq!(parsed.record.text("x-edge-location"), Some("FRA50"));
        assert_eq!(parsed.record.int("sc-bytes"), Some(512));
    }

    #[test]
    fn test_object_date_wins_over_line_date() {
        let schema = schema("#Fields date time x-edge-location");
        let parsed = parse_data_line("2023-04-30\t23:59:59\tIAD12", date(), &schema).unwrap();
        assert_eq!(parsed.record.text("humantstamp"), Some("2023-05-01T23:59:59"));
    }

    #[test]
    fn test_full_cloudfront_line() {
        let schema = schema(
            "#Fields: date time x-edge-location sc-bytes c-ip cs-method cs(Host) cs-uri-stem sc-status cs(Referer) cs(User-Agent) cs-uri-query",
        );
        let line = "2023-05-01\t12:30:00\tFRA50\t2048\t192.0.2.10\tGET\td111.cloudfront.net\t/index.html\t200\t-\tMozilla/5.0%2520(X11;+Linux)\tq=1";
        let parsed = parse_data_line(line, date(), &schema).unwrap();
        let record = &parsed.record;

        assert_eq!(record.int("sc-status"), Some(200));
        assert_eq!(record.int("sc-bytes"), Some(2048));
        assert_eq!(record.text("cs_Host"), Some("d111.cloudfront.net"));
        assert_eq!(record.text("cs_Referer"), Some("-"));
        assert_eq!(record.text("cs_User-Agent"), Some("Mozilla/5.0%20(X11; Linux)"));
        assert_eq!(record.text("cs-uri-query"), Some("q=1"));
    }

    #[test]
    fn test_zip_truncates_both_ways() {
        let schema = schema("#Fields date time a b c");
        let short = parse_data_line("d\t00:00:00\tonly-a", date(), &schema).unwrap();
        assert_eq!(short.record.len(), 3);
        assert!(short.record.get("b").is_none());

        let long = parse_data_line("d\t00:00:00\t1\t2\t3\t4\t5", date(), &schema).unwrap();
        assert_eq!(long.record.len(), 5);
    }

    #[test]
    fn test_non_numeric_status() {
        let schema = schema("#Fields date time sc-status");
        let err = parse_data_line("d\t00:00:01\tOK", date(), &schema).unwrap_err();
        assert!(matches!(err, ParseError::FieldCoercion { ref field, .. } if field == "sc-status"));
    }

    #[test]
    fn test_non_numeric_bytes() {
        let schema = schema("#Fields date time x-edge-location sc-bytes sc-status");
        let err = parse_data_line("d\t00:00:01\tFRA50\t12kb\t200", date(), &schema).unwrap_err();
        assert!(matches!(
            err,
            ParseError::FieldCoercion { ref field, ref value } if field == "sc-bytes" && value == "12kb"
        ));
    }

    #[test]
    fn test_bad_time_of_day() {
        let schema = schema("#Fields date time sc-status");
        let err = parse_data_line("d\tnoon\t200", date(), &schema).unwrap_err();
        assert!(matches!(err, ParseError::InvalidTime(_)));
    }

    #[test]
    fn test_json_is_stable() {
        let schema = schema("#Fields date time sc-status x-edge-location");
        let a = parse_data_line("d\t01:00:00\t304\tLHR3", date(), &schema).unwrap();
        let b = parse_data_line("d\t01:00:00\t304\tLHR3", date(), &schema).unwrap();
        let json = a.record.to_json().unwrap();
        assert_eq!(json, b.record.to_json().unwrap());
        assert_eq!(LogRecord::from_json(&json).unwrap(), a.record);
    }
}
