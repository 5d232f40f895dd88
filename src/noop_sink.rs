use crate::client::CommitMode;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops all records.
///
/// Installed when Quickwit indexing is disabled: the layer still writes the
/// daily files, nothing leaves the process.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send_batch(&self, _records: &[LogRecord], _commit: CommitMode) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    fn describe(&self) -> String {
        "disabled".to_string()
    }
}
