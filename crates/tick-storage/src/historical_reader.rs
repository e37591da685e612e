#![allow(unsafe_code)]
//! Reads every persisted batch back from the storage locations.
//!
//! Discovery scans each location for `<prefix>*.bin` files and groups the
//! copies by file name. Replicas of one batch share a name, so each name is
//! loaded once: the first readable copy wins and the remaining replicas only
//! act as fallbacks.
//!
//! Batches are concatenated in file-name order, which is chronological for
//! the timestamped naming schemes.

use anyhow::Context;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tick_core::{decode_records, DecodedRecords, Record, RecorderError, Result};
use tracing::{debug, error, info, warn};

use crate::compression::{decode_payload, CompressionType};
use crate::naming::matches_convention;

/// A copy of a batch file that could not be loaded.
#[derive(Debug, Clone)]
pub struct ReadFailure {
    /// File that failed to load
    pub path: PathBuf,
    /// Rendered error chain
    pub error: String,
}

/// Everything a full history read produced.
#[derive(Debug, Clone, Default)]
pub struct ReadReport {
    /// Records from every loaded batch, in file-name order
    pub records: Vec<Record>,
    /// Distinct file names discovered
    pub files_discovered: usize,
    /// File names whose contents were loaded
    pub files_read: usize,
    /// Additional copies of already-discovered names
    pub duplicate_copies: usize,
    /// Copies that failed to load (including ones a later replica covered)
    pub failures: Vec<ReadFailure>,
    /// Bytes ignored because they did not form a whole record
    pub trailing_bytes: usize,
}

/// Loads all batch files from a set of storage locations.
#[derive(Debug, Clone)]
pub struct HistoricalReader {
    locations: Vec<PathBuf>,
    compression: CompressionType,
    prefix: String,
}

impl HistoricalReader {
    /// The compression setting must match the one the files were written with.
    pub fn new(
        locations: Vec<PathBuf>,
        compression: CompressionType,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            locations,
            compression,
            prefix: prefix.into(),
        }
    }

    /// Directories scanned for batch files
    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    /// Map of file name to every path holding a copy, in location order.
    pub fn discover(&self) -> BTreeMap<String, Vec<PathBuf>> {
        let mut found: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for location in &self.locations {
            let entries = match fs::read_dir(location) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(location = %location.display(), error = %e, "Skipping unreadable storage location");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                if !is_file {
                    continue;
                }
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if matches_convention(&self.prefix, &name) {
                    found.entry(name).or_default().push(entry.path());
                }
            }
        }
        found
    }

    /// All stored records, one copy per file name.
    pub fn read_all(&self) -> Vec<Record> {
        self.read_all_with_report().records
    }

    /// Like [`read_all`](Self::read_all) but also reports what was skipped.
    pub fn read_all_with_report(&self) -> ReadReport {
        let discovered = self.discover();
        let mut report = ReadReport {
            files_discovered: discovered.len(),
            ..Default::default()
        };

        for (name, copies) in &discovered {
            report.duplicate_copies += copies.len().saturating_sub(1);

            let mut loaded = false;
            for path in copies {
                match self.read_file(path) {
                    Ok(decoded) => {
                        if decoded.trailing_bytes > 0 {
                            warn!(
                                path = %path.display(),
                                trailing_bytes = decoded.trailing_bytes,
                                "Ignoring bytes past the last whole record"
                            );
                        }
                        report.trailing_bytes += decoded.trailing_bytes;
                        report.records.extend(decoded.records);
                        report.files_read += 1;
                        loaded = true;
                        break;
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Failed to read batch file");
                        report.failures.push(ReadFailure {
                            path: path.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            if !loaded {
                warn!(file = %name, copies = copies.len(), "No readable copy of batch file; skipping");
            }
        }

        info!(
            files = report.files_read,
            discovered = report.files_discovered,
            duplicates = report.duplicate_copies,
            failures = report.failures.len(),
            records = report.records.len(),
            "Historical read complete"
        );
        report
    }

    /// Load and decode one batch file.
    pub fn read_file(&self, path: &Path) -> Result<DecodedRecords> {
        let bytes = load_bytes(path).map_err(|e| match e.downcast::<std::io::Error>() {
            Ok(source) => RecorderError::io(path, source),
            Err(other) => RecorderError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("{other:#}"),
            },
        })?;

        if bytes.is_empty() {
            debug!(path = %path.display(), "Empty batch file");
            return Ok(DecodedRecords::default());
        }

        let raw = decode_payload(bytes, self.compression, path)?;
        Ok(decode_records(&raw))
    }
}

/// Copy a file's contents out of a read-only mapping.
fn load_bytes(path: &Path) -> anyhow::Result<Vec<u8>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    // Zero-length mappings are rejected by the OS.
    if len == 0 {
        return Ok(Vec::new());
    }

    // SAFETY: the mapping is read-only and copied out before it is dropped.
    // Batch files are written once under their final name and not modified
    // while the reader runs.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to map {}", path.display()))?;
    Ok(mmap.to_vec())
}
