//! In-memory batching in front of a [`BatchSink`].
//!
//! Records accumulate in a batch until it reaches the configured capacity or
//! someone calls [`BufferedWriter::flush`]. A flush moves the whole batch into
//! a dedicated writer thread and starts a fresh batch straight away, so
//! `write` callers only wait on disk I/O when the previous flush has not yet
//! finished.
//!
//! # Invariants
//!
//! - At most one flush thread is in flight per writer. A new flush joins the
//!   previous one first, which serializes batch N before batch N+1.
//! - The batch lock is never held across a join or any I/O. The flush-slot lock
//!   is, and that wait is the intended backpressure point.
//! - Lock order is slot, then batch. `write` only takes the batch lock.
//! - A failed flush is logged and counted, never retried. Its records are gone
//!   from durable storage once the batch was handed off.
//! - A failure that is not confined to one location or file (see
//!   [`RecorderError::is_local`]) is returned from the next `write` or `flush`
//!   that joins it, so producers stop feeding storage that persists nothing.
//! - [`Drop`] closes the writer: the remaining batch is flushed and the
//!   outstanding thread is joined on every exit path.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tick_core::{Record, RecorderError, Result};
use tracing::{debug, error, warn};

use crate::sink::BatchSink;
use crate::storage_writer::{StorageWriter, WriteReport};

type FlushHandle = JoinHandle<Result<WriteReport>>;

struct BatchState {
    records: Vec<Record>,
    closed: bool,
}

/// Writer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records accepted by `write`
    pub records_written: u64,
    /// Flushes whose sink call succeeded
    pub batches_flushed: u64,
    /// Records contained in successful flushes
    pub records_flushed: u64,
    /// Flushes whose sink call failed or panicked
    pub failed_flushes: u64,
    /// Flushes that had to wait for the previous one to finish
    pub backpressure_waits: u64,
    /// Records currently sitting in the open batch
    pub pending_records: usize,
}

/// Batching writer with one asynchronous flush slot.
pub struct BufferedWriter<S: BatchSink = StorageWriter> {
    sink: Arc<S>,
    capacity: usize,
    batch: Mutex<BatchState>,
    in_flight: Mutex<Option<FlushHandle>>,
    records_written: AtomicU64,
    batches_flushed: AtomicU64,
    records_flushed: AtomicU64,
    failed_flushes: AtomicU64,
    backpressure_waits: AtomicU64,
}

impl<S: BatchSink> BufferedWriter<S> {
    /// Create a writer that flushes automatically every `capacity` records.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(sink: Arc<S>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            capacity,
            batch: Mutex::new(BatchState {
                records: Vec::with_capacity(capacity),
                closed: false,
            }),
            in_flight: Mutex::new(None),
            records_written: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            records_flushed: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            backpressure_waits: AtomicU64::new(0),
        }
    }

    /// Records per automatic flush
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record; flushes before returning if the batch is full.
    ///
    /// Fails with [`RecorderError::WriterClosed`] after [`close`](Self::close).
    pub fn write(&self, record: Record) -> Result<()> {
        let full = {
            let mut batch = self.batch.lock();
            if batch.closed {
                return Err(RecorderError::WriterClosed);
            }
            batch.records.push(record);
            batch.records.len() >= self.capacity
        };
        self.records_written.fetch_add(1, Ordering::Relaxed);

        if full {
            self.flush()?;
        }
        Ok(())
    }

    /// Hand the current batch to a new flush thread.
    ///
    /// Does nothing if the batch is empty. If the previous flush is still
    /// running, blocks until it finishes. A non-local failure of that previous
    /// flush is returned instead of starting a new one; the current batch stays
    /// buffered.
    pub fn flush(&self) -> Result<()> {
        let mut slot = self.in_flight.lock();

        if self.batch.lock().records.is_empty() {
            return Ok(());
        }

        if let Some(previous) = slot.take() {
            if !previous.is_finished() {
                self.backpressure_waits.fetch_add(1, Ordering::Relaxed);
                warn!(
                    capacity = self.capacity,
                    "Waiting for previous flush to finish; consider a larger buffer capacity"
                );
            }
            if let Err(e) = self.join_flush(previous) {
                if !e.is_local() {
                    return Err(e);
                }
            }
        }

        // Take whatever accumulated while we waited.
        let batch = {
            let mut state = self.batch.lock();
            std::mem::replace(&mut state.records, Vec::with_capacity(self.capacity))
        };
        if batch.is_empty() {
            return Ok(());
        }

        debug!(records = batch.len(), "Starting flush");
        let sink = Arc::clone(&self.sink);
        let handle = thread::Builder::new()
            .name("batch-flush".into())
            .spawn(move || sink.write_batch(&batch))
            .map_err(|source| RecorderError::Spawn {
                name: "batch-flush".into(),
                source,
            })?;
        *slot = Some(handle);
        Ok(())
    }

    /// Wait for the in-flight flush, if any, and return its outcome.
    pub fn wait_idle(&self) -> Result<Option<WriteReport>> {
        let mut slot = self.in_flight.lock();
        match slot.take() {
            Some(handle) => self.join_flush(handle).map(Some),
            None => Ok(None),
        }
    }

    /// Stop accepting records, flush what is buffered and wait for it.
    ///
    /// The remaining batch is flushed even if the flush before it failed.
    /// Returns the first error of those two flushes. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.batch.lock().closed = true;
        let previous = self.wait_idle().map(|_| ());
        let last = self
            .flush()
            .and_then(|()| self.wait_idle())
            .map(|_| ());
        previous.and(last)
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.batch.lock().closed
    }

    /// Get current statistics
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            records_written: self.records_written.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            records_flushed: self.records_flushed.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
            pending_records: self.batch.lock().records.len(),
        }
    }

    /// Join a flush thread and account for its outcome.
    fn join_flush(&self, handle: FlushHandle) -> Result<WriteReport> {
        match handle.join() {
            Ok(Ok(report)) => {
                self.batches_flushed.fetch_add(1, Ordering::Relaxed);
                self.records_flushed
                    .fetch_add(report.records as u64, Ordering::Relaxed);
                debug!(
                    file = %report.file_name,
                    records = report.records,
                    replicas = report.written.len(),
                    "Flush complete"
                );
                Ok(report)
            }
            Ok(Err(e)) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Flush failed; batch records were not persisted");
                Err(e)
            }
            Err(_) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                error!("Flush thread panicked; batch records were not persisted");
                Err(RecorderError::FlushTaskPanicked)
            }
        }
    }
}

impl<S: BatchSink> Drop for BufferedWriter<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Final flush on drop failed");
        }
    }
}

impl<S: BatchSink> std::fmt::Debug for BufferedWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedWriter")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tick_core::Timestamp;

    /// Sink that records batches and tracks how many calls overlap.
    #[derive(Default)]
    struct ProbeSink {
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        batches: Mutex<Vec<Vec<Record>>>,
    }

    impl ProbeSink {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn batches(&self) -> Vec<Vec<Record>> {
            self.batches.lock().clone()
        }
    }

    impl BatchSink for ProbeSink {
        fn write_batch(&self, batch: &[Record]) -> Result<WriteReport> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.batches.lock().push(batch.to_vec());
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(WriteReport {
                file_name: "probe.bin".into(),
                records: batch.len(),
                ..Default::default()
            })
        }
    }

    struct FailingSink {
        calls: AtomicUsize,
    }

    impl BatchSink for FailingSink {
        fn write_batch(&self, _batch: &[Record]) -> Result<WriteReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RecorderError::AllLocationsFailed {
                file_name: "data_x.bin".into(),
                attempted: 2,
            })
        }
    }

    struct PanickingSink;

    impl BatchSink for PanickingSink {
        fn write_batch(&self, _batch: &[Record]) -> Result<WriteReport> {
            panic!("sink exploded");
        }
    }

    fn rec(i: i64) -> Record {
        Record::new(100.0 + i as f64, i, Timestamp::from_nanos(i))
    }

    #[test]
    fn test_flushes_exactly_at_capacity() {
        let sink = Arc::new(ProbeSink::default());
        let writer = BufferedWriter::new(Arc::clone(&sink), 3);

        writer.write(rec(1)).unwrap();
        writer.write(rec(2)).unwrap();
        assert_eq!(writer.stats().pending_records, 2);
        writer.wait_idle().unwrap();
        assert!(sink.batches().is_empty());

        writer.write(rec(3)).unwrap();
        assert_eq!(writer.stats().pending_records, 0);
        let report = writer.wait_idle().unwrap().unwrap();
        assert_eq!(report.records, 3);

        assert_eq!(sink.batches(), vec![vec![rec(1), rec(2), rec(3)]]);
    }

    #[test]
    fn test_explicit_flush_keeps_order() {
        let sink = Arc::new(ProbeSink::default());
        let writer = BufferedWriter::new(Arc::clone(&sink), 100);

        for i in 0..5 {
            writer.write(rec(i)).unwrap();
        }
        writer.flush().unwrap();
        writer.wait_idle().unwrap();

        let expected: Vec<_> = (0..5).map(rec).collect();
        assert_eq!(sink.batches(), vec![expected]);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let sink = Arc::new(ProbeSink::default());
        let writer = BufferedWriter::new(Arc::clone(&sink), 10);
        writer.flush().unwrap();
        assert!(writer.wait_idle().unwrap().is_none());
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn test_concurrent_flushes_never_overlap() {
        let sink = Arc::new(ProbeSink::with_delay(Duration::from_millis(2)));
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&sink), 7));

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    for i in 0..50 {
                        writer.write(rec(t * 1000 + i)).unwrap();
                        if i % 5 == 0 {
                            writer.flush().unwrap();
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        writer.close().unwrap();

        assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);

        let batches = sink.batches();
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, 400, "no record dropped or duplicated");

        let unique: HashSet<i64> = batches.iter().flatten().map(|r| r.volume()).collect();
        assert_eq!(unique.len(), 400);

        let stats = writer.stats();
        assert_eq!(stats.records_written, 400);
        assert_eq!(stats.records_flushed, 400);
        assert_eq!(stats.failed_flushes, 0);
    }

    #[test]
    fn test_backpressure_serializes_batches() {
        let sink = Arc::new(ProbeSink::with_delay(Duration::from_millis(100)));
        let writer = BufferedWriter::new(Arc::clone(&sink), 1);

        writer.write(rec(1)).unwrap();
        writer.write(rec(2)).unwrap();
        writer.close().unwrap();

        assert_eq!(sink.batches(), vec![vec![rec(1)], vec![rec(2)]]);
        assert!(writer.stats().backpressure_waits >= 1);
    }

    #[test]
    fn test_write_after_close_is_rejected() {
        let sink = Arc::new(ProbeSink::default());
        let writer = BufferedWriter::new(sink, 10);
        writer.write(rec(1)).unwrap();
        writer.close().unwrap();

        assert!(writer.is_closed());
        assert!(matches!(writer.write(rec(2)), Err(RecorderError::WriterClosed)));
        // Closing again is harmless
        writer.close().unwrap();
    }

    #[test]
    fn test_drop_flushes_remaining_batch() {
        let sink = Arc::new(ProbeSink::default());
        {
            let writer = BufferedWriter::new(Arc::clone(&sink), 10);
            writer.write(rec(1)).unwrap();
            writer.write(rec(2)).unwrap();
        }
        assert_eq!(sink.batches(), vec![vec![rec(1), rec(2)]]);
    }

    #[test]
    fn test_failed_flush_is_reported_not_retried() {
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let writer = BufferedWriter::new(Arc::clone(&sink), 2);

        writer.write(rec(1)).unwrap();
        writer.write(rec(2)).unwrap();
        let outcome = writer.wait_idle();
        assert!(matches!(outcome, Err(RecorderError::AllLocationsFailed { .. })));

        // Subsequent flushes proceed; the failed batch is gone.
        writer.write(rec(3)).unwrap();
        writer.write(rec(4)).unwrap();
        let _ = writer.wait_idle();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        let stats = writer.stats();
        assert_eq!(stats.failed_flushes, 2);
        assert_eq!(stats.batches_flushed, 0);
    }

    #[test]
    fn test_failed_flush_is_returned_by_next_write() {
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let writer = BufferedWriter::new(Arc::clone(&sink), 1);

        writer.write(rec(1)).unwrap();
        let err = writer.write(rec(2)).unwrap_err();
        assert!(matches!(err, RecorderError::AllLocationsFailed { .. }));

        // The record that triggered the failing join stays buffered until close.
        assert_eq!(writer.stats().pending_records, 1);
        assert!(writer.close().is_err());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(writer.stats().pending_records, 0);
    }

    #[test]
    fn test_local_flush_failure_does_not_block_writes() {
        struct FlakySink;
        impl BatchSink for FlakySink {
            fn write_batch(&self, _batch: &[Record]) -> Result<WriteReport> {
                Err(RecorderError::Compression("bad block".into()))
            }
        }

        let writer = BufferedWriter::new(Arc::new(FlakySink), 1);
        for i in 0..4 {
            writer.write(rec(i)).unwrap();
        }
        assert!(writer.close().is_err());
        assert_eq!(writer.stats().failed_flushes, 4);
    }

    #[test]
    fn test_panicking_flush_surfaces_as_error() {
        let writer = BufferedWriter::new(Arc::new(PanickingSink), 1);
        writer.write(rec(1)).unwrap();
        assert!(matches!(
            writer.wait_idle(),
            Err(RecorderError::FlushTaskPanicked)
        ));
        assert_eq!(writer.stats().failed_flushes, 1);
    }

    #[test]
    fn test_zero_capacity_flushes_every_record() {
        let sink = Arc::new(ProbeSink::default());
        let writer = BufferedWriter::new(Arc::clone(&sink), 0);
        assert_eq!(writer.capacity(), 1);
        writer.write(rec(1)).unwrap();
        writer.close().unwrap();
        assert_eq!(sink.batches(), vec![vec![rec(1)]]);
    }
}
