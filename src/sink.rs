use crate::client::CommitMode;
use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for batches of [`LogRecord`]s produced by the
/// logging layer.
///
/// Implementations transport records to a concrete backend. The layer calls
/// `send_batch` from its background task and never awaits it on the
/// application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver a batch of records.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the whole batch.
    /// - `Err(..)` if the backend failed (network error, HTTP status,
    ///   serialization). The layer reports the failure and drops the batch;
    ///   the records are still in the daily log file.
    async fn send_batch(&self, records: &[LogRecord], commit: CommitMode) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered records, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    /// Human readable target, used in stats and error messages.
    fn describe(&self) -> String {
        "custom sink".to_string()
    }
}
