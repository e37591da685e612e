//! End-to-end recording run.
//!
//! ```text
//! Generator ──push──► RecordQueue ──pop──► Collector × N ──write──► BufferedWriter ──► StorageWriter
//!    (1 thread)                               (N threads)                (flush thread)
//! ```
//!
//! The generator runs on the caller's [`RunSignal`]; the collectors run on a
//! second signal owned by the pipeline. The run stops when the collection
//! duration elapses or when someone else stops the caller's signal (Ctrl-C in
//! the binary). Shutdown always follows the same order: stop and join the
//! generator, stop and wake the collectors and join them, then close the
//! buffered writer so the final partial batch is flushed and waited for.
//! Stopping the generator first means a draining collector sees every record
//! that will ever be produced.
//!
//! A collector that fails stops the caller's signal, so a storage failure
//! that reaches the collectors ends the whole run instead of letting the
//! generator keep producing until the duration elapses.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tick_core::{RecorderError, Result, RunSignal};
use tick_storage::{BatchSink, BufferedWriter, ReadReport, StorageStats, WriterStats};
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::config::RecorderConfig;
use crate::generator::Generator;
use crate::queue::RecordQueue;

/// What a finished run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Records pushed by the generator
    pub generated: u64,
    /// Records forwarded by all collectors
    pub collected: u64,
    /// Records still queued when the collectors stopped
    pub left_in_queue: usize,
    /// Buffered writer counters after the final flush
    pub writer: WriterStats,
    /// Storage counters, when the run wrote to a [`tick_storage::StorageWriter`]
    pub storage: Option<StorageStats>,
    /// Whether the run was stopped before its configured duration
    pub stopped_early: bool,
    /// Wall-clock time from start to the end of shutdown
    pub elapsed: Duration,
}

/// Wires the ingestion components together.
pub struct Pipeline;

impl Pipeline {
    /// Record into the configured storage locations.
    pub fn run(config: &RecorderConfig, signal: RunSignal) -> Result<RunSummary> {
        config.validate()?;
        let storage = Arc::new(config.storage.writer_builder().build()?);
        let mut summary = Self::run_with_sink(config, Arc::clone(&storage), signal)?;
        summary.storage = Some(storage.stats());
        Ok(summary)
    }

    /// Record into an arbitrary batch sink.
    pub fn run_with_sink<S: BatchSink>(
        config: &RecorderConfig,
        sink: Arc<S>,
        signal: RunSignal,
    ) -> Result<RunSummary> {
        config.validate()?;
        let pipeline = &config.pipeline;

        let queue = Arc::new(RecordQueue::new());
        let writer = Arc::new(BufferedWriter::new(sink, config.storage.buffer_capacity));
        let started = Instant::now();

        info!(
            collectors = pipeline.collector_count,
            interval_ms = pipeline.generation_interval_ms,
            duration_ms = pipeline.collection_duration_ms,
            buffer_capacity = config.storage.buffer_capacity,
            "Starting recording run"
        );

        let generator = Generator::new(Arc::clone(&queue), pipeline.generation_interval())
            .with_price_range(pipeline.price_min..pipeline.price_max)
            .with_volume_range(pipeline.volume_min..=pipeline.volume_max);
        let generator_signal = signal.clone();
        let generator_handle = spawn_named("generator".into(), move || {
            generator.run(&generator_signal)
        })?;

        let collect_signal = RunSignal::new();
        let mut collectors: Vec<(usize, JoinHandle<Result<u64>>)> =
            Vec::with_capacity(pipeline.collector_count);
        let mut spawn_error = None;
        for id in 0..pipeline.collector_count {
            let collector = Collector::new(id, Arc::clone(&queue), Arc::clone(&writer))
                .with_poll_interval(pipeline.poll_interval())
                .with_drain_on_shutdown(pipeline.drain_on_shutdown);
            let collector_signal = collect_signal.clone();
            let run_signal = signal.clone();
            match spawn_named(format!("collector-{id}"), move || {
                let outcome = collector.run(&collector_signal);
                if outcome.is_err() {
                    run_signal.stop();
                }
                outcome
            }) {
                Ok(handle) => collectors.push((id, handle)),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        let stopped_early = if spawn_error.is_none() {
            signal.wait_timeout(pipeline.collection_duration())
        } else {
            true
        };
        if stopped_early {
            info!("Stop requested before the collection duration elapsed");
        }

        signal.stop();
        let mut first_error = spawn_error;
        let generated = match join_named("generator", generator_handle) {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "Generator failed");
                first_error.get_or_insert(e);
                0
            }
        };

        collect_signal.stop();
        queue.wake_all();

        let mut collected = 0u64;
        for (id, handle) in collectors {
            match handle.join() {
                Ok(Ok(count)) => collected += count,
                Ok(Err(e)) => {
                    error!(collector = id, error = %e, "Collector failed");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    error!(collector = id, "Collector thread panicked");
                    first_error.get_or_insert(RecorderError::CollectorFailed {
                        id,
                        reason: "thread panicked".into(),
                    });
                }
            }
        }

        let close_result = writer.close();
        let stats = writer.stats();

        let left_in_queue = queue.len();
        if left_in_queue > 0 {
            warn!(left_in_queue, "Records left in queue at shutdown were not persisted");
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        close_result?;

        let summary = RunSummary {
            generated,
            collected,
            left_in_queue,
            writer: stats,
            storage: None,
            stopped_early,
            elapsed: started.elapsed(),
        };
        info!(
            generated = summary.generated,
            collected = summary.collected,
            batches = summary.writer.batches_flushed,
            failed_flushes = summary.writer.failed_flushes,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Recording run complete"
        );
        Ok(summary)
    }

    /// Read back everything stored under the configured locations.
    pub fn read_history(config: &RecorderConfig) -> ReadReport {
        config.storage.historical_reader().read_all_with_report()
    }
}

fn spawn_named<F, T>(name: String, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|source| RecorderError::Spawn { name, source })
}

fn join_named<T>(name: &str, handle: JoinHandle<T>) -> Result<T> {
    handle.join().map_err(|_| RecorderError::ThreadPanicked {
        name: name.to_string(),
    })
}
