//! # Tick Recorder
//!
//! Concurrent ingestion of market data records into redundant on-disk storage,
//! plus historical replay of everything stored.
//!
//! ## Crate Structure
//!
//! - **`queue`**: `RecordQueue`, the thread-safe FIFO between producer and consumers.
//! - **`generator`**: `Generator`, a fixed-cadence synthetic record producer.
//! - **`collector`**: `Collector`, a queue consumer feeding the buffered writer.
//! - **`pipeline`**: `Pipeline`, which wires the above to storage and owns shutdown.
//! - **`config`**: `RecorderConfig`, layered Figment configuration with validation.
//! - **`tracing_init`**: subscriber setup for the binary.
//!
//! Records, errors and the run signal live in `tick-core`; batching, storage and
//! the historical reader live in `tick-storage`. Both are re-exported here.

pub mod collector;
pub mod config;
pub mod generator;
pub mod pipeline;
pub mod queue;
pub mod tracing_init;

pub use collector::Collector;
pub use config::RecorderConfig;
pub use generator::Generator;
pub use pipeline::{Pipeline, RunSummary};
pub use queue::{ConcurrentQueue, RecordQueue};

pub use tick_core::{Record, RecorderError, Result, RunSignal, Timestamp};
pub use tick_storage::{
    BatchSink, BufferedWriter, CompressionType, FileNaming, HistoricalReader, ReadReport,
    StorageWriter,
};
