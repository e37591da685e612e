//! Market data record and its fixed binary layout.
//!
//! Every file written by the storage layer is either the raw concatenation of
//! records in this layout or a compressed frame wrapping exactly those bytes,
//! so writer and reader must agree on it byte for byte.
//!
//! Layout (24 bytes, little-endian, no padding):
//! - price: f64 (8 bytes)
//! - volume: i64 (8 bytes)
//! - timestamp: i64 nanoseconds since the UNIX epoch (8 bytes)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one encoded [`Record`] in bytes.
pub const RECORD_SIZE: usize = 24;

const PRICE_OFFSET: usize = 0;
const VOLUME_OFFSET: usize = 8;
const TIMESTAMP_OFFSET: usize = 16;

/// Wall-clock instant with nanosecond resolution.
///
/// Stored as signed nanoseconds since the UNIX epoch, which keeps the encoded
/// form fixed-width and lets external reporting use [`Timestamp::as_millis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        // Saturates past the year 2262, where i64 nanoseconds run out.
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    /// Build from nanoseconds since the UNIX epoch.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since the UNIX epoch.
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Milliseconds since the UNIX epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0.div_euclid(1_000_000)
    }

    /// Convert to a chrono UTC datetime.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp_nanos_opt().unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_millis())
    }
}

/// A single market data observation.
///
/// Records are immutable: fields are only readable, and the type is `Copy`
/// so every hand-off through the pipeline moves an independent copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    price: f64,
    volume: i64,
    timestamp: Timestamp,
}

impl Record {
    /// Create a new record.
    pub const fn new(price: f64, volume: i64, timestamp: Timestamp) -> Self {
        Self {
            price,
            volume,
            timestamp,
        }
    }

    /// Create a record stamped with the current time.
    pub fn now(price: f64, volume: i64) -> Self {
        Self::new(price, volume, Timestamp::now())
    }

    /// Trade price
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Trade volume
    pub const fn volume(&self) -> i64 {
        self.volume
    }

    /// Capture time
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Encode into the fixed 24-byte layout.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[PRICE_OFFSET..VOLUME_OFFSET].copy_from_slice(&self.price.to_le_bytes());
        out[VOLUME_OFFSET..TIMESTAMP_OFFSET].copy_from_slice(&self.volume.to_le_bytes());
        out[TIMESTAMP_OFFSET..RECORD_SIZE].copy_from_slice(&self.timestamp.0.to_le_bytes());
        out
    }

    /// Decode from the fixed 24-byte layout.
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut price = [0u8; 8];
        let mut volume = [0u8; 8];
        let mut timestamp = [0u8; 8];
        price.copy_from_slice(&bytes[PRICE_OFFSET..VOLUME_OFFSET]);
        volume.copy_from_slice(&bytes[VOLUME_OFFSET..TIMESTAMP_OFFSET]);
        timestamp.copy_from_slice(&bytes[TIMESTAMP_OFFSET..RECORD_SIZE]);

        Self {
            price: f64::from_le_bytes(price),
            volume: i64::from_le_bytes(volume),
            timestamp: Timestamp(i64::from_le_bytes(timestamp)),
        }
    }
}

/// Result of decoding a byte buffer into records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecords {
    /// Complete records, in buffer order.
    pub records: Vec<Record>,
    /// Bytes at the end of the buffer that did not form a whole record.
    pub trailing_bytes: usize,
}

/// Concatenate the fixed layout of every record, preserving order.
pub fn encode_records(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * RECORD_SIZE);
    for record in records {
        out.extend_from_slice(&record.to_bytes());
    }
    out
}

/// Reinterpret a byte buffer as a sequence of records.
///
/// A partial record at the end of the buffer is not an error here; it is
/// reported through [`DecodedRecords::trailing_bytes`] so callers can decide
/// how loudly to complain.
pub fn decode_records(bytes: &[u8]) -> DecodedRecords {
    let chunks = bytes.chunks_exact(RECORD_SIZE);
    let trailing_bytes = chunks.remainder().len();
    let records = chunks
        .map(|chunk| {
            let mut fixed = [0u8; RECORD_SIZE];
            fixed.copy_from_slice(chunk);
            Record::from_bytes(&fixed)
        })
        .collect();

    DecodedRecords {
        records,
        trailing_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_fixed_width() {
        let record = Record::new(100.0, 5, Timestamp::from_nanos(1_700_000_000_123_456_789));
        let bytes = record.to_bytes();

        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(&bytes[0..8], &100.0f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &5i64.to_le_bytes());
        assert_eq!(&bytes[16..24], &1_700_000_000_123_456_789i64.to_le_bytes());
    }

    #[test]
    fn test_encode_preserves_order() {
        let batch = vec![
            Record::new(100.0, 5, Timestamp::from_nanos(1)),
            Record::new(101.5, 7, Timestamp::from_nanos(2)),
            Record::new(99.0, 3, Timestamp::from_nanos(3)),
        ];

        let bytes = encode_records(&batch);
        assert_eq!(bytes.len(), 3 * RECORD_SIZE);

        let decoded = decode_records(&bytes);
        assert_eq!(decoded.records, batch);
    }

    #[test]
    fn test_decode_reports_trailing_bytes() {
        let mut bytes = encode_records(&[Record::new(1.0, 1, Timestamp::from_nanos(10))]);
        bytes.extend_from_slice(&[0xAB; 5]);

        let decoded = decode_records(&bytes);
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.trailing_bytes, 5);
    }

    #[test]
    fn test_decode_empty_buffer() {
        let decoded = decode_records(&[]);
        assert!(decoded.records.is_empty());
        assert_eq!(decoded.trailing_bytes, 0);
    }

    #[test]
    fn test_negative_values_survive() {
        let record = Record::new(-0.25, -42, Timestamp::from_nanos(-1_500_000));
        let decoded = Record::from_bytes(&record.to_bytes());
        assert_eq!(decoded, record);
        assert_eq!(decoded.timestamp().as_millis(), -2);
    }

    #[test]
    fn test_timestamp_millis() {
        let ts = Timestamp::from_nanos(1_700_000_000_123_456_789);
        assert_eq!(ts.as_millis(), 1_700_000_000_123);
        assert_eq!(ts.to_datetime().timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_now_is_after_epoch() {
        let record = Record::now(250.0, 10);
        assert!(record.timestamp().as_nanos() > 0);
    }

    #[test]
    fn test_record_serde() {
        let record = Record::new(101.5, 7, Timestamp::from_nanos(2));
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
