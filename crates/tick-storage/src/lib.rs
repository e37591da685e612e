//! Durable batch storage for the tick recorder.
//!
//! # Architecture
//!
//! ```text
//! collectors ─► BufferedWriter ──(one flush thread at a time)──► StorageWriter
//!                                                                   │
//!                                     random N of M locations ◄─────┘
//!                                     remote1/ remote2/ remote3/ remote4/
//!                                                                   │
//!                               HistoricalReader ◄──── scan + dedup by name
//! ```
//!
//! - [`BufferedWriter`] batches records and hands full batches to a sink on a
//!   background thread, blocking writers only while a previous flush runs.
//! - [`StorageWriter`] encodes a batch (raw or LZ4), chooses replica locations
//!   and writes each copy through a memory mapping followed by a sync.
//! - [`HistoricalReader`] recovers every record, loading each batch once
//!   regardless of how many replicas exist.

pub mod buffered_writer;
pub mod compression;
pub mod historical_reader;
pub mod naming;
pub mod placement;
pub mod sink;
pub mod storage_writer;

pub use buffered_writer::{BufferedWriter, WriterStats};
pub use compression::CompressionType;
pub use historical_reader::{HistoricalReader, ReadFailure, ReadReport};
pub use naming::{FileNamer, FileNaming};
pub use sink::BatchSink;
pub use storage_writer::{
    LocationFailure, StorageStats, StorageWriter, StorageWriterBuilder, WriteReport,
};
