//! Batch file naming.
//!
//! One name is generated per flush and reused verbatim at every location the
//! batch is replicated to, which is what lets the reader deduplicate copies by
//! file name alone.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// File name suffix shared by every batch file.
pub const FILE_SUFFIX: &str = ".bin";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// How the time component of a batch file name is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileNaming {
    /// `<prefix>YYYY-MM-DD_HH:MM:SS.bin`. Two flushes within the same second
    /// share a name and the later one overwrites the earlier file.
    #[default]
    Seconds,
    /// `<prefix>YYYY-MM-DD_HH:MM:SS_NNNNNN.bin` with a per-writer counter.
    Sequenced,
}

/// Generates batch file names and recognises them during discovery.
#[derive(Debug)]
pub struct FileNamer {
    prefix: String,
    naming: FileNaming,
    sequence: AtomicU64,
}

impl FileNamer {
    /// Namer for files starting with `prefix`.
    pub fn new(prefix: impl Into<String>, naming: FileNaming) -> Self {
        Self {
            prefix: prefix.into(),
            naming,
            sequence: AtomicU64::new(0),
        }
    }

    /// File name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Name for a batch flushed now.
    pub fn next_name(&self) -> String {
        self.name_at(Local::now())
    }

    /// Name for a batch flushed at `when`.
    pub fn name_at(&self, when: DateTime<Local>) -> String {
        let stamp = when.format(TIMESTAMP_FORMAT);
        match self.naming {
            FileNaming::Seconds => format!("{}{}{}", self.prefix, stamp, FILE_SUFFIX),
            FileNaming::Sequenced => {
                let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
                format!("{}{}_{:06}{}", self.prefix, stamp, seq, FILE_SUFFIX)
            }
        }
    }

    /// Whether `file_name` follows the `<prefix>*.bin` convention.
    pub fn matches(&self, file_name: &str) -> bool {
        matches_convention(&self.prefix, file_name)
    }
}

/// Whether `file_name` starts with `prefix` and ends with the batch suffix.
pub fn matches_convention(prefix: &str, file_name: &str) -> bool {
    file_name.len() >= prefix.len() + FILE_SUFFIX.len()
        && file_name.starts_with(prefix)
        && file_name.ends_with(FILE_SUFFIX)
}
