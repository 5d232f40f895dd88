use crate::client::{CommitMode, QuickwitClient};
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;

/// [`LogSink`] that ingests batches into the log index of one application.
///
/// The index is created from the client's template on first use.
#[derive(Clone)]
pub struct QuickwitSink {
    client: QuickwitClient,
    app_name: String,
    index_id: String,
}

impl QuickwitSink {
    pub fn new(client: QuickwitClient, app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        let index_id = client.index_id_for(&app_name);
        QuickwitSink {
            client,
            app_name,
            index_id,
        }
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    pub fn client(&self) -> &QuickwitClient {
        &self.client
    }
}

#[async_trait]
impl LogSink for QuickwitSink {
    async fn send_batch(&self, records: &[LogRecord], commit: CommitMode) -> Result<(), Box<dyn Error + Send + Sync>> {
        if records.is_empty() {
            return Ok(());
        }
        self.client.create_log_index(&self.app_name).await?;
        self.client
            .index_documents(&self.index_id, records, commit)
            .await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.client.server_url(), self.index_id)
    }
}
