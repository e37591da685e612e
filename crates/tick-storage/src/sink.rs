//! Destination seam for flushed batches.

use tick_core::{Record, Result};

use crate::storage_writer::WriteReport;

/// Something that durably stores a whole batch in one call.
///
/// [`crate::StorageWriter`] is the production implementation. The buffered
/// writer only depends on this trait, so flush scheduling can be exercised
/// against instrumented sinks.
pub trait BatchSink: Send + Sync + 'static {
    /// Persist `batch`, preserving record order within it.
    fn write_batch(&self, batch: &[Record]) -> Result<WriteReport>;
}
