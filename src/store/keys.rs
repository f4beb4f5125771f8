//! Key layout and encoding utilities for the bucket keyspace
//!
//! Partition structure:
//! - `records`: rec:{date}:{sort:020}:{payload} -> (empty)
//! - `counts`: cnt:{date} -> u64 (big-endian)
//! - `metadata`: meta:sealed:{date} -> sealed-at epoch seconds
//!
//! The sort key is offset into `u64` space and zero-padded so lexicographic
//! key order equals numeric order, negatives included. The payload is part of
//! the key, which makes `(sort_key, payload)` the identity of an entry.

use crate::bucket::DayBucket;

/// Width of a zero-padded `u64`
const SORT_KEY_WIDTH: usize = 20;

/// Fjall rejects keys longer than this
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

fn offset_sort_key(sort_key: i64) -> u64 {
    (sort_key as u64) ^ (1 << 63)
}

fn restore_sort_key(offset: u64) -> i64 {
    (offset ^ (1 << 63)) as i64
}

/// Encode a record prefix for range scan: rec:{date}:
pub fn encode_record_prefix(bucket: DayBucket) -> Vec<u8> {
    format!("rec:{}:", bucket).into_bytes()
}

/// Encode a record key: rec:{date}:{sort:020}:{payload}
pub fn encode_record_key(bucket: DayBucket, sort_key: i64, payload: &str) -> Vec<u8> {
    format!(
        "rec:{}:{:0width$}:{}",
        bucket,
        offset_sort_key(sort_key),
        payload,
        width = SORT_KEY_WIDTH
    )
    .into_bytes()
}

/// Decode a record key -> (date, sort_key, payload)
pub fn decode_record_key(key: &[u8]) -> Option<(DayBucket, i64, String)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let rest = key_str.strip_prefix("rec:")?;
    let (date, rest) = rest.split_once(':')?;
    let sort = rest.get(..SORT_KEY_WIDTH)?;
    let payload = rest.get(SORT_KEY_WIDTH..)?.strip_prefix(':')?;
    Some((
        date.parse().ok()?,
        restore_sort_key(sort.parse().ok()?),
        payload.to_string(),
    ))
}

/// Encode a count key: cnt:{date}
pub fn encode_count_key(bucket: DayBucket) -> Vec<u8> {
    format!("cnt:{}", bucket).into_bytes()
}

/// Decode a count key: cnt:{date} -> date
pub fn decode_count_key(key: &[u8]) -> Option<DayBucket> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("cnt:")?.parse().ok()
}

/// Encode a seal marker key: meta:sealed:{date}
pub fn encode_sealed_key(bucket: DayBucket) -> Vec<u8> {
    format!("meta:sealed:{}", bucket).into_bytes()
}
