//! Recorder configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults ([`RecorderConfig::default`])
//! 2. `config/recorder.toml` (or the file passed to [`RecorderConfig::load_from`])
//! 3. Environment variables prefixed with `TICK_RECORDER_`, using `__` between
//!    section and key, e.g. `TICK_RECORDER_STORAGE__REDUNDANCY_LEVEL=3`
//!
//! # Example
//! ```no_run
//! use tick_recorder::config::RecorderConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RecorderConfig::load()?;
//! config.validate()?;
//! println!("Writing to {} locations", config.storage.locations.len());
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tick_core::{RecorderError, Result};
use tick_storage::{CompressionType, FileNaming, HistoricalReader, StorageWriterBuilder, StorageWriter};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/recorder.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TICK_RECORDER_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level recorder configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Generation and collection settings
    pub pipeline: PipelineConfig,
    /// Buffering and storage settings
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "tick-recorder".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Generator and collector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Time between generated records
    pub generation_interval_ms: u64,
    /// Number of collector threads
    pub collector_count: usize,
    /// How long `record` runs before stopping on its own
    pub collection_duration_ms: u64,
    /// Upper bound on how long an idle collector waits before re-checking for shutdown
    pub poll_interval_ms: u64,
    /// Whether collectors empty the queue after a stop request
    pub drain_on_shutdown: bool,
    /// Lower bound of generated prices (inclusive)
    pub price_min: f64,
    /// Upper bound of generated prices (exclusive)
    pub price_max: f64,
    /// Lower bound of generated volumes (inclusive)
    pub volume_min: i64,
    /// Upper bound of generated volumes (inclusive)
    pub volume_max: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generation_interval_ms: 5,
            collector_count: 10,
            collection_duration_ms: 500,
            poll_interval_ms: 10,
            drain_on_shutdown: false,
            price_min: 100.0,
            price_max: 500.0,
            volume_min: 1,
            volume_max: 1000,
        }
    }
}

impl PipelineConfig {
    /// Generator tick interval
    pub fn generation_interval(&self) -> Duration {
        Duration::from_millis(self.generation_interval_ms)
    }

    /// How long a run records
    pub fn collection_duration(&self) -> Duration {
        Duration::from_millis(self.collection_duration_ms)
    }

    /// Collector idle poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Records per batch before an automatic flush
    pub buffer_capacity: usize,
    /// Payload compression (none or lz4)
    pub compression: CompressionType,
    /// Copies written per batch; values <= 0 disable persistence
    pub redundancy_level: i32,
    /// Storage location directories
    pub locations: Vec<PathBuf>,
    /// Batch file name prefix
    pub file_prefix: String,
    /// Batch file naming scheme (seconds or sequenced)
    pub file_naming: FileNaming,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            compression: CompressionType::Lz4,
            redundancy_level: 2,
            locations: (1..=4).map(|i| PathBuf::from(format!("remote{i}"))).collect(),
            file_prefix: "data_".to_string(),
            file_naming: FileNaming::Seconds,
        }
    }
}

impl StorageConfig {
    /// Storage writer builder carrying these settings.
    pub fn writer_builder(&self) -> StorageWriterBuilder {
        StorageWriter::builder()
            .locations(self.locations.iter().cloned())
            .redundancy(self.redundancy_level)
            .compression(self.compression)
            .file_prefix(self.file_prefix.clone())
            .file_naming(self.file_naming)
    }

    /// Reader configured symmetrically with the writer.
    pub fn historical_reader(&self) -> HistoricalReader {
        HistoricalReader::new(self.locations.clone(), self.compression, self.file_prefix.clone())
    }
}

impl RecorderConfig {
    /// Load configuration from `config/recorder.toml` and environment variables
    pub fn load() -> std::result::Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> std::result::Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    /// The layered provider chain, exposed for callers that add their own layers.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(RecorderConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        let pipeline = &self.pipeline;
        if pipeline.generation_interval_ms == 0 {
            return invalid("generation_interval_ms must be greater than 0");
        }
        if pipeline.collector_count == 0 {
            return invalid("collector_count must be at least 1");
        }
        if !(pipeline.price_min.is_finite() && pipeline.price_max.is_finite())
            || pipeline.price_min >= pipeline.price_max
        {
            return invalid(format!(
                "Invalid price range [{}, {}): min must be below max",
                pipeline.price_min, pipeline.price_max
            ));
        }
        if pipeline.volume_min > pipeline.volume_max {
            return invalid(format!(
                "Invalid volume range [{}, {}]: min must not exceed max",
                pipeline.volume_min, pipeline.volume_max
            ));
        }

        let storage = &self.storage;
        if storage.buffer_capacity == 0 {
            return invalid("buffer_capacity must be at least 1");
        }
        if storage.locations.is_empty() {
            return invalid("At least one storage location must be configured");
        }
        if storage.file_prefix.is_empty() {
            return invalid("file_prefix must not be empty");
        }
        if storage.file_prefix.contains(['/', '\\']) {
            return invalid(format!(
                "file_prefix '{}' must not contain a path separator",
                storage.file_prefix
            ));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Result<()> {
    Err(RecorderError::Configuration(message.into()))
}
