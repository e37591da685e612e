//! `tick-core`
//!
//! Shared building blocks for the tick recorder pipeline.
//!
//! This crate holds the pieces every other crate in the workspace agrees on:
//!
//! - [`Record`]: the immutable market data unit (price, volume, timestamp)
//! - [`Timestamp`]: nanosecond wall-clock instant with a millisecond view
//! - the fixed 24-byte record layout ([`RECORD_SIZE`], [`encode_records`], [`decode_records`])
//! - [`RecorderError`]: the workspace-wide error type
//! - [`RunSignal`]: the cooperative cancellation token handed to every component
//!
//! ## Example
//!
//! ```rust
//! use tick_core::{decode_records, encode_records, Record, Timestamp};
//!
//! let batch = vec![
//!     Record::new(100.0, 5, Timestamp::from_nanos(1)),
//!     Record::new(101.5, 7, Timestamp::from_nanos(2)),
//! ];
//! let bytes = encode_records(&batch);
//! let decoded = decode_records(&bytes);
//! assert_eq!(decoded.records, batch);
//! assert_eq!(decoded.trailing_bytes, 0);
//! ```

pub mod error;
pub mod record;
pub mod signal;

pub use error::{RecorderError, Result};
pub use record::{decode_records, encode_records, DecodedRecords, Record, Timestamp, RECORD_SIZE};
pub use signal::RunSignal;
