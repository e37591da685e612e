//! CLI Entry Point for tick-recorder
//!
//! # Usage
//!
//! Record for the configured duration (Ctrl-C stops early):
//! ```bash
//! tick-recorder record --config config/recorder.toml
//! ```
//!
//! Print everything stored so far:
//! ```bash
//! tick-recorder replay --limit 20
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tick_recorder::config::{RecorderConfig, DEFAULT_CONFIG_PATH};
use tick_recorder::tracing_init::{self, OutputFormat, TracingConfig};
use tick_recorder::{Pipeline, RunSignal};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "tick-recorder")]
#[command(about = "Concurrent market data recorder with redundant storage", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, collect and persist records
    Record {
        /// Override the configured collection duration
        #[arg(long)]
        duration_ms: Option<u64>,
    },

    /// Read back every stored record
    Replay {
        /// Print at most this many records
        #[arg(long)]
        limit: Option<usize>,

        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RecorderConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Commands::Record {
        duration_ms: Some(ms),
    } = &cli.command
    {
        config.pipeline.collection_duration_ms = *ms;
    }
    config.validate()?;

    let tracing_config =
        TracingConfig::from_recorder_config(&config).map_err(anyhow::Error::msg)?;
    tracing_init::init(tracing_config.with_format(cli.log_format)).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Record { .. } => record(&config),
        Commands::Replay { limit, json } => replay(&config, limit, json),
    }
}

fn record(config: &RecorderConfig) -> Result<()> {
    let signal = RunSignal::new();
    install_ctrl_c_handler(signal.clone());

    let summary = Pipeline::run(config, signal).context("Recording run failed")?;

    println!("Generated:      {}", summary.generated);
    println!("Collected:      {}", summary.collected);
    println!("Left in queue:  {}", summary.left_in_queue);
    println!("Batches:        {}", summary.writer.batches_flushed);
    println!("Failed flushes: {}", summary.writer.failed_flushes);
    if let Some(storage) = &summary.storage {
        println!("Files written:  {}", storage.files_written);
        println!("Bytes written:  {}", storage.bytes_written);
    }
    println!("Elapsed:        {:?}", summary.elapsed);
    Ok(())
}

fn replay(config: &RecorderConfig, limit: Option<usize>, json: bool) -> Result<()> {
    let report = Pipeline::read_history(config);
    let shown = limit.unwrap_or(report.records.len());

    if json {
        for record in report.records.iter().take(shown) {
            println!("{}", serde_json::to_string(record)?);
        }
    } else {
        println!("{:>15} | {:>10} | {:>6}", "Time", "Price", "Volume");
        for record in report.records.iter().take(shown) {
            println!(
                "{:>15} | {:>10.2} | {:>6}",
                record.timestamp(),
                record.price(),
                record.volume()
            );
        }
    }

    info!(
        records = report.records.len(),
        files = report.files_read,
        duplicates = report.duplicate_copies,
        "Replay complete"
    );
    if !report.failures.is_empty() {
        warn!(failures = report.failures.len(), "Some batch files could not be read");
    }
    Ok(())
}

/// Stop `signal` on Ctrl-C.
///
/// The pipeline runs on plain threads, so the listener gets its own
/// single-threaded runtime on a detached thread.
fn install_ctrl_c_handler(signal: RunSignal) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create signal handler runtime: {}", e);
                return;
            }
        };

        rt.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Received Ctrl+C - stopping recording");
                    signal.stop();
                }
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    });
}
