#![allow(unsafe_code)]
//! Redundant batch file writer.
//!
//! Each call to [`StorageWriter::write_data`] serializes one batch, picks a
//! random subset of the configured locations and writes an independent full
//! copy of the batch into each of them under one shared file name.
//!
//! # Write path
//!
//! ```text
//! batch ─► encode_payload (raw / LZ4 frame)
//!            │
//!            ├─► remote1/<name>.bin   open ─► set_len ─► mmap ─► copy ─► msync ─► unmap
//!            └─► remote3/<name>.bin   (independent; a failure here does not stop remote1)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tick_core::Record;
//! use tick_storage::{CompressionType, StorageWriter};
//!
//! # fn main() -> tick_core::Result<()> {
//! let writer = StorageWriter::builder()
//!     .locations(["remote1", "remote2", "remote3"])
//!     .redundancy(2)
//!     .compression(CompressionType::Lz4)
//!     .file_prefix("data_")
//!     .build()?;
//!
//! let report = writer.write_data(&[Record::now(101.5, 7)])?;
//! assert_eq!(report.written.len(), 2);
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use memmap2::MmapOptions;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tick_core::{Record, RecorderError, Result};
use tracing::{debug, error, info, warn};

use crate::compression::{encode_payload, CompressionType};
use crate::historical_reader::HistoricalReader;
use crate::naming::{FileNamer, FileNaming};
use crate::placement::select_locations;
use crate::sink::BatchSink;

/// One location that did not receive its copy of a batch.
#[derive(Debug, Clone)]
pub struct LocationFailure {
    /// Full path of the file that could not be written
    pub path: PathBuf,
    /// Rendered error chain
    pub error: String,
}

/// Outcome of a single [`StorageWriter::write_data`] call.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    /// File name shared by every copy
    pub file_name: String,
    /// Records in the batch
    pub records: usize,
    /// Size of the on-disk payload (after compression)
    pub payload_bytes: usize,
    /// Files that were written and synced
    pub written: Vec<PathBuf>,
    /// Locations that were selected but failed
    pub failures: Vec<LocationFailure>,
}

impl WriteReport {
    /// Whether every selected location received its copy.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Batches that reached at least one location
    pub batches_written: u64,
    /// Individual files written (one per replica)
    pub files_written: u64,
    /// Payload bytes written, summed across replicas
    pub bytes_written: u64,
    /// Selected locations that failed
    pub location_failures: u64,
}

/// Builder for StorageWriter
#[derive(Debug, Clone)]
pub struct StorageWriterBuilder {
    locations: Vec<PathBuf>,
    redundancy: i32,
    compression: CompressionType,
    file_prefix: String,
    file_naming: FileNaming,
}

impl Default for StorageWriterBuilder {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            redundancy: 1,
            compression: CompressionType::None,
            file_prefix: "data_".to_string(),
            file_naming: FileNaming::Seconds,
        }
    }
}

impl StorageWriterBuilder {
    /// Add a single storage location
    pub fn location(mut self, path: impl Into<PathBuf>) -> Self {
        self.locations.push(path.into());
        self
    }

    /// Add several storage locations
    pub fn locations<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.locations.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Number of locations each batch is copied to (<= 0 writes nowhere)
    pub fn redundancy(mut self, level: i32) -> Self {
        self.redundancy = level;
        self
    }

    /// Set compression type
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Set file name prefix
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Set file naming scheme
    pub fn file_naming(mut self, naming: FileNaming) -> Self {
        self.file_naming = naming;
        self
    }

    /// Create missing location directories and build the writer.
    ///
    /// Locations that cannot be prepared are logged and left out of placement.
    /// Fails only if none of them is usable.
    pub fn build(self) -> Result<StorageWriter> {
        if self.locations.is_empty() {
            return Err(RecorderError::Configuration(
                "At least one storage location must be configured".into(),
            ));
        }
        if self.file_prefix.is_empty() {
            return Err(RecorderError::Configuration(
                "File prefix must not be empty".into(),
            ));
        }

        let configured = self.locations.len();
        let mut usable = Vec::with_capacity(configured);
        for location in self.locations {
            match prepare_location(&location) {
                Ok(()) => usable.push(location),
                Err(e) => {
                    let rendered = format!("{e:#}");
                    error!(location = %location.display(), error = %rendered, "Storage location unusable");
                }
            }
        }

        if usable.is_empty() {
            return Err(RecorderError::NoUsableLocation);
        }

        info!(
            usable = usable.len(),
            configured,
            redundancy = self.redundancy,
            compression = ?self.compression,
            "Storage writer ready"
        );

        Ok(StorageWriter {
            locations: usable,
            redundancy: self.redundancy,
            compression: self.compression,
            namer: FileNamer::new(self.file_prefix, self.file_naming),
            batches_written: AtomicU64::new(0),
            files_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            location_failures: AtomicU64::new(0),
        })
    }
}

/// Writes batches as redundant memory-mapped files.
#[derive(Debug)]
pub struct StorageWriter {
    locations: Vec<PathBuf>,
    redundancy: i32,
    compression: CompressionType,
    namer: FileNamer,
    batches_written: AtomicU64,
    files_written: AtomicU64,
    bytes_written: AtomicU64,
    location_failures: AtomicU64,
}

impl StorageWriter {
    /// Create a new builder
    pub fn builder() -> StorageWriterBuilder {
        StorageWriterBuilder::default()
    }

    /// Locations that passed preparation
    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    /// Configured redundancy level
    pub fn redundancy(&self) -> i32 {
        self.redundancy
    }

    /// Payload compression
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Batch file name prefix
    pub fn file_prefix(&self) -> &str {
        self.namer.prefix()
    }

    /// A reader configured symmetrically with this writer.
    pub fn historical_reader(&self) -> HistoricalReader {
        HistoricalReader::new(self.locations.clone(), self.compression, self.namer.prefix())
    }

    /// Serialize `batch` and write one copy per selected location.
    ///
    /// Per-location failures are logged and collected in the report; the
    /// call only errors when serialization fails or no selected location
    /// could be written. Nothing is retried.
    pub fn write_data(&self, batch: &[Record]) -> Result<WriteReport> {
        let file_name = self.namer.next_name();
        let targets = select_locations(&self.locations, self.redundancy, &mut rand::thread_rng());

        let mut report = WriteReport {
            file_name,
            records: batch.len(),
            ..Default::default()
        };

        if targets.is_empty() {
            warn!(
                file = %report.file_name,
                records = batch.len(),
                redundancy = self.redundancy,
                "Redundancy level selects no locations; batch not persisted"
            );
            return Ok(report);
        }

        let payload = encode_payload(batch, self.compression)?;
        report.payload_bytes = payload.len();

        for dir in targets {
            let path = dir.join(&report.file_name);
            match write_file(&path, &payload) {
                Ok(overwrote) => {
                    if overwrote {
                        warn!(
                            path = %path.display(),
                            "Batch file name already existed; previous contents overwritten"
                        );
                    }
                    self.files_written.fetch_add(1, Ordering::Relaxed);
                    self.bytes_written
                        .fetch_add(payload.len() as u64, Ordering::Relaxed);
                    report.written.push(path);
                }
                Err(e) => {
                    let rendered = format!("{e:#}");
                    error!(path = %path.display(), error = %rendered, "Failed to write batch file");
                    self.location_failures.fetch_add(1, Ordering::Relaxed);
                    report.failures.push(LocationFailure {
                        path,
                        error: rendered,
                    });
                }
            }
        }

        if report.written.is_empty() {
            return Err(RecorderError::AllLocationsFailed {
                file_name: report.file_name,
                attempted: report.failures.len(),
            });
        }

        self.batches_written.fetch_add(1, Ordering::Relaxed);
        debug!(
            file = %report.file_name,
            records = report.records,
            payload_bytes = report.payload_bytes,
            replicas = report.written.len(),
            failed = report.failures.len(),
            "Batch written"
        );

        Ok(report)
    }

    /// Get current statistics
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            batches_written: self.batches_written.load(Ordering::Relaxed),
            files_written: self.files_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            location_failures: self.location_failures.load(Ordering::Relaxed),
        }
    }
}

impl BatchSink for StorageWriter {
    fn write_batch(&self, batch: &[Record]) -> Result<WriteReport> {
        self.write_data(batch)
    }
}

fn prepare_location(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::ensure!(path.is_dir(), "{} exists but is not a directory", path.display());
        debug!(location = %path.display(), "Storage location already exists");
        return Ok(());
    }
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create storage location {}", path.display()))?;
    info!(location = %path.display(), "Created storage location");
    Ok(())
}

/// Write `payload` to `path` through a shared mapping and sync it to disk.
///
/// Returns whether the file existed before this call.
fn write_file(path: &Path, payload: &[u8]) -> anyhow::Result<bool> {
    let existed = path.exists();

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open batch file {}", path.display()))?;

    file.set_len(payload.len() as u64)
        .context("Failed to set batch file size")?;

    // Zero-length mappings are rejected by the OS; the empty file is already complete.
    if payload.is_empty() {
        file.sync_all().context("Failed to sync empty batch file")?;
        return Ok(existed);
    }

    // SAFETY: the file was opened read/write by this call and sized to exactly
    // payload.len() bytes; the mapping is dropped before the function returns.
    let mut mmap = unsafe {
        MmapOptions::new()
            .len(payload.len())
            .map_mut(&file)
            .context("Failed to map batch file")?
    };
    mmap.copy_from_slice(payload);
    mmap.flush().context("Failed to sync batch file")?;
    drop(mmap);

    Ok(existed)
}
