//! Queue consumers that feed the buffered writer.

use std::sync::Arc;
use std::time::Duration;
use tick_core::{Record, RecorderError, Result, RunSignal};
use tick_storage::{BatchSink, BufferedWriter, StorageWriter};
use tracing::{debug, trace};

use crate::queue::RecordQueue;

/// How long an idle collector waits on the queue before re-checking the run signal.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Moves records from the shared queue into the shared buffered writer.
pub struct Collector<S: BatchSink = StorageWriter> {
    id: usize,
    queue: Arc<RecordQueue>,
    writer: Arc<BufferedWriter<S>>,
    poll_interval: Duration,
    drain_on_shutdown: bool,
}

impl<S: BatchSink> Collector<S> {
    /// Collector `id` reading from `queue` and writing into `writer`.
    pub fn new(id: usize, queue: Arc<RecordQueue>, writer: Arc<BufferedWriter<S>>) -> Self {
        Self {
            id,
            queue,
            writer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_on_shutdown: false,
        }
    }

    /// How long to block on an empty queue before re-checking the signal.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Keep popping after the stop request until the queue is empty.
    pub fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }

    /// Collect until `signal` stops; returns the number of records forwarded.
    ///
    /// A failed `write` ends this collector with [`RecorderError::CollectorFailed`].
    pub fn run(&self, signal: &RunSignal) -> Result<u64> {
        debug!(collector = self.id, "Collector started");

        let mut collected = 0u64;
        while signal.is_running() {
            if let Some(record) = self.queue.pop_timeout(self.poll_interval) {
                self.forward(record)?;
                collected += 1;
            }
        }

        if self.drain_on_shutdown {
            while let Some(record) = self.queue.pop() {
                self.forward(record)?;
                collected += 1;
            }
        }

        debug!(collector = self.id, collected, "Collector stopped");
        Ok(collected)
    }

    fn forward(&self, record: Record) -> Result<()> {
        trace!(
            collector = self.id,
            timestamp_ms = record.timestamp().as_millis(),
            price = record.price(),
            volume = record.volume(),
            "Collected record"
        );
        self.writer
            .write(record)
            .map_err(|e| RecorderError::CollectorFailed {
                id: self.id,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::thread;
    use tick_core::Timestamp;
    use tick_storage::WriteReport;

    #[derive(Default)]
    struct MemorySink {
        batches: Mutex<Vec<Vec<Record>>>,
    }

    impl BatchSink for MemorySink {
        fn write_batch(&self, batch: &[Record]) -> Result<WriteReport> {
            self.batches.lock().push(batch.to_vec());
            Ok(WriteReport {
                records: batch.len(),
                ..Default::default()
            })
        }
    }

    fn rec(i: i64) -> Record {
        Record::new(100.0, i, Timestamp::from_nanos(i))
    }

    #[test]
    fn test_collectors_deliver_each_record_once() {
        let queue = Arc::new(RecordQueue::new());
        let sink = Arc::new(MemorySink::default());
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&sink), 16));
        let signal = RunSignal::new();

        for i in 0..500 {
            queue.push(rec(i));
        }

        let handles: Vec<_> = (0..4)
            .map(|id| {
                let collector = Collector::new(id, Arc::clone(&queue), Arc::clone(&writer))
                    .with_poll_interval(Duration::from_millis(1));
                let signal = signal.clone();
                thread::spawn(move || collector.run(&signal))
            })
            .collect();

        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        signal.stop();
        queue.wake_all();

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap().unwrap()).sum();
        writer.close().unwrap();

        assert_eq!(total, 500);
        let volumes: HashSet<i64> = sink
            .batches
            .lock()
            .iter()
            .flatten()
            .map(|r| r.volume())
            .collect();
        assert_eq!(volumes.len(), 500);
    }

    #[test]
    fn test_single_collector_preserves_order() {
        let queue = Arc::new(RecordQueue::new());
        let sink = Arc::new(MemorySink::default());
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&sink), 1_000));
        let signal = RunSignal::new();
        signal.stop();

        for i in 0..20 {
            queue.push(rec(i));
        }
        let collector = Collector::new(0, Arc::clone(&queue), Arc::clone(&writer))
            .with_drain_on_shutdown(true);
        assert_eq!(collector.run(&signal).unwrap(), 20);
        writer.close().unwrap();

        let expected: Vec<_> = (0..20).map(rec).collect();
        assert_eq!(*sink.batches.lock(), vec![expected]);
    }

    #[test]
    fn test_no_drain_leaves_queue_untouched() {
        let queue = Arc::new(RecordQueue::new());
        let writer = Arc::new(BufferedWriter::new(Arc::new(MemorySink::default()), 10));
        let signal = RunSignal::new();
        signal.stop();

        queue.push(rec(1));
        let collector = Collector::new(3, Arc::clone(&queue), writer);
        assert_eq!(collector.run(&signal).unwrap(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_closed_writer_fails_collector() {
        let queue = Arc::new(RecordQueue::new());
        let writer = Arc::new(BufferedWriter::new(Arc::new(MemorySink::default()), 10));
        writer.close().unwrap();
        let signal = RunSignal::new();
        signal.stop();

        queue.push(rec(1));
        let collector = Collector::new(7, Arc::clone(&queue), writer).with_drain_on_shutdown(true);
        let err = collector.run(&signal).unwrap_err();
        assert!(matches!(err, RecorderError::CollectorFailed { id: 7, .. }));
    }
}
