use crate::client::{CommitMode, QuickwitClient, QuickwitError};
use crate::config::QuickwitConfig;
use crate::daily_file::list_log_files;
use crate::processor::{parse_timestamp, LogProcessor};
use crate::record::{format_timestamp, Document};
use crate::storage::MinioStorage;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Records per ingest request when syncing a file.
pub const SYNC_BATCH_SIZE: usize = 100;

/// A log entry handed to [`QuickwitLogger`]: a document or raw JSON text.
#[derive(Debug, Clone)]
pub enum LogInput {
    Document(Document),
    Json(String),
}

impl From<Document> for LogInput {
    fn from(doc: Document) -> Self {
        LogInput::Document(doc)
    }
}

impl From<String> for LogInput {
    fn from(json: String) -> Self {
        LogInput::Json(json)
    }
}

impl From<&str> for LogInput {
    fn from(json: &str) -> Self {
        LogInput::Json(json.to_string())
    }
}

impl From<Value> for LogInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(doc) => LogInput::Document(doc),
            other => LogInput::Json(other.to_string()),
        }
    }
}

impl LogInput {
    fn into_document(self) -> Result<Document, String> {
        match self {
            LogInput::Document(doc) => Ok(doc),
            LogInput::Json(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(doc)) => Ok(doc),
                Ok(_) => Err("expected a JSON object".to_string()),
                Err(e) => Err(e.to_string()),
            },
        }
    }
}

/// Give `doc` a UTC timestamp with a `Z` suffix.
///
/// A parsable timestamp is converted to UTC; a missing or unparsable one is
/// replaced by the current time.
pub fn normalize_timestamp(doc: &mut Document) {
    let parsed = doc
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .map(|ts| ts.with_timezone(&Utc));
    let ts = parsed.unwrap_or_else(Utc::now);
    doc.insert("timestamp".into(), Value::String(format_timestamp(&ts)));
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub success: bool,
    pub files_processed: usize,
    pub files_uploaded: usize,
    pub uploaded_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadReport {
    fn done(message: impl Into<String>) -> Self {
        UploadReport {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        UploadReport {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub logs_processed: usize,
    pub logs_sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggerStats {
    pub app_name: String,
    pub index_id: String,
    pub logs_directory: PathBuf,
    pub log_files_count: usize,
    pub quickwit_enabled: bool,
    pub minio_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_stats: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Direct, unbatched access to the log index and the log archive.
///
/// Works with any structured input: documents built in code, JSON strings
/// from other tools, or whole log files. Every operation reports failure
/// through its return value instead of an error.
///
/// ```no_run
/// # async fn demo() -> Result<(), quickwit_log::client::QuickwitError> {
/// use quickwit_log::client::CommitMode;
/// use quickwit_log::config::QuickwitConfig;
/// use quickwit_log::logger::QuickwitLogger;
///
/// let logger = QuickwitLogger::new(QuickwitConfig::default(), None)?;
/// logger
///     .send_log(r#"{"level": "ERROR", "message": "Database connection failed"}"#, CommitMode::Auto)
///     .await;
/// # Ok(())
/// # }
/// ```
pub struct QuickwitLogger {
    config: QuickwitConfig,
    app_name: String,
    client: QuickwitClient,
    storage: Option<MinioStorage>,
    processor: LogProcessor,
}

impl QuickwitLogger {
    /// Logger for `app_name`, or the configured app when `None`. No object
    /// storage is attached; see [`with_storage`](Self::with_storage).
    pub fn new(config: QuickwitConfig, app_name: Option<String>) -> Result<Self, QuickwitError> {
        let client = QuickwitClient::new(&config)?;
        Ok(Self::with_client(config, client, app_name))
    }

    pub fn with_client(config: QuickwitConfig, client: QuickwitClient, app_name: Option<String>) -> Self {
        let app_name = app_name.unwrap_or_else(|| config.app_name.clone());
        QuickwitLogger {
            config,
            app_name,
            client,
            storage: None,
            processor: LogProcessor::new(),
        }
    }

    /// Like [`new`](Self::new), connecting to MinIO when uploads are enabled.
    pub async fn connect(config: QuickwitConfig, app_name: Option<String>) -> Result<Self, QuickwitError> {
        let storage = crate::init::storage_for(&config).await;
        let mut logger = Self::new(config, app_name)?;
        logger.storage = storage;
        Ok(logger)
    }

    pub fn with_storage(mut self, storage: MinioStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn index_id(&self) -> String {
        self.config.index_id_for(&self.app_name)
    }

    pub fn client(&self) -> &QuickwitClient {
        &self.client
    }

    fn prepare(&self, input: LogInput) -> Option<Document> {
        let mut doc = match input.into_document() {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(error = %e, "invalid JSON in log data");
                return None;
            }
        };
        normalize_timestamp(&mut doc);
        doc.entry("app_name")
            .or_insert_with(|| Value::String(self.app_name.clone()));
        Some(doc)
    }

    async fn ship(&self, docs: &[Document], commit: CommitMode) -> bool {
        let result: Result<(), QuickwitError> = async {
            self.client.create_log_index(&self.app_name).await?;
            self.client.index_documents(&self.index_id(), docs, commit).await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "error sending logs to Quickwit");
                false
            }
        }
    }

    /// Send one entry immediately.
    ///
    /// **Returns**
    /// - `true` if Quickwit accepted it, or indexing is disabled.
    /// - `false` for invalid JSON or a failed request.
    pub async fn send_log(&self, input: impl Into<LogInput>, commit: CommitMode) -> bool {
        if !self.config.enable_quickwit_indexing {
            return true;
        }
        match self.prepare(input.into()) {
            Some(doc) => self.ship(std::slice::from_ref(&doc), commit).await,
            None => false,
        }
    }

    /// Send several entries in one request. Invalid entries are skipped;
    /// `false` if none is left or the request failed. An empty input is a
    /// success.
    pub async fn send_logs_batch(&self, inputs: Vec<LogInput>, commit: CommitMode) -> bool {
        if !self.config.enable_quickwit_indexing || inputs.is_empty() {
            return true;
        }
        let docs: Vec<Document> = inputs
            .into_iter()
            .filter_map(|input| self.prepare(input))
            .collect();
        if docs.is_empty() {
            return false;
        }
        self.ship(&docs, commit).await
    }

    /// Upload the `*.json` and `*.log` files of `logs_dir` (default: the
    /// configured directory) to object storage.
    pub async fn upload_logs_to_minio(&self, logs_dir: Option<&Path>) -> UploadReport {
        if !self.config.enable_minio_uploads {
            return UploadReport::done("MinIO uploads disabled in config");
        }
        let Some(storage) = &self.storage else {
            return UploadReport::failed("MinIO storage is not configured");
        };

        let dir = logs_dir.unwrap_or(self.config.logs_dir.as_path());
        if !dir.is_dir() {
            return UploadReport::failed(format!("Logs directory does not exist: {}", dir.display()));
        }

        let files = match list_log_files(dir) {
            Ok(files) => files,
            Err(e) => return UploadReport::failed(e.to_string()),
        };
        if files.is_empty() {
            return UploadReport::done("No log files found");
        }

        let mut report = UploadReport {
            success: true,
            files_processed: files.len(),
            ..Default::default()
        };
        for file in &files {
            match storage.upload_log_file(&self.app_name, file).await {
                Ok(url) => {
                    report.files_uploaded += 1;
                    report.uploaded_urls.push(url);
                }
                Err(e) => tracing::error!(path = %file.display(), error = %e, "failed to upload log file"),
            }
        }
        report
    }

    /// Read a log file into documents. Lines that are not JSON objects
    /// become `{message, line_number, file, timestamp}` entries.
    pub fn parse_log_file(&self, path: &Path) -> Vec<Document> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "error parsing log file");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let Ok(line) = line else {
                tracing::error!(path = %path.display(), line = index + 1, "log file is not valid UTF-8");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(doc)) => entries.push(doc),
                _ => {
                    let mut doc = Document::new();
                    doc.insert("message".into(), Value::String(line.to_string()));
                    doc.insert("line_number".into(), Value::from(index + 1));
                    doc.insert("file".into(), Value::String(path.display().to_string()));
                    doc.insert("timestamp".into(), Value::String(format_timestamp(&Utc::now())));
                    entries.push(doc);
                }
            }
        }
        entries
    }

    /// Parse a log file and send it in batches of [`SYNC_BATCH_SIZE`].
    pub async fn sync_log_file(&self, path: &Path, commit: CommitMode) -> SyncReport {
        let entries = self.parse_log_file(path);
        if entries.is_empty() {
            return SyncReport {
                success: true,
                message: Some("No valid log entries found".to_string()),
                ..Default::default()
            };
        }

        let processed = entries.len();
        let mut sent = 0;
        for batch in self.processor.batch_logs(entries, SYNC_BATCH_SIZE) {
            let size = batch.len();
            let inputs = batch.into_iter().map(LogInput::Document).collect();
            if self.send_logs_batch(inputs, commit).await {
                sent += size;
            }
        }

        SyncReport {
            success: true,
            logs_processed: processed,
            logs_sent: sent,
            message: None,
        }
    }

    pub async fn get_stats(&self) -> LoggerStats {
        let logs_dir = self.config.logs_dir.clone();
        let log_files_count = list_log_files(&logs_dir).map(|f| f.len()).unwrap_or(0);

        let mut stats = LoggerStats {
            app_name: self.app_name.clone(),
            index_id: self.index_id(),
            logs_directory: logs_dir,
            log_files_count,
            quickwit_enabled: self.config.enable_quickwit_indexing,
            minio_enabled: self.config.enable_minio_uploads,
            index_stats: None,
            error: None,
        };

        if stats.quickwit_enabled {
            match self.client.get_index_stats(&stats.index_id).await {
                Ok(index_stats) => stats.index_stats = Some(index_stats),
                Err(e) => stats.error = Some(format!("Could not get index stats: {}", e)),
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn logger(config: QuickwitConfig) -> QuickwitLogger {
        QuickwitLogger::new(config, Some("shop".into())).unwrap()
    }

    #[test]
    fn normalizes_timestamps_to_utc_z() {
        let mut doc = Document::new();
        doc.insert("timestamp".into(), json!("2024-05-01T14:00:00+02:00"));
        normalize_timestamp(&mut doc);
        assert_eq!(doc["timestamp"], "2024-05-01T12:00:00.000000Z");

        let mut missing = Document::new();
        normalize_timestamp(&mut missing);
        assert!(missing["timestamp"].as_str().unwrap().ends_with('Z'));

        let mut garbage = Document::new();
        garbage.insert("timestamp".into(), json!(17));
        normalize_timestamp(&mut garbage);
        assert!(garbage["timestamp"].is_string());

        let mut minutes = Document::new();
        minutes.insert("timestamp".into(), json!("2024-01-01T10:00"));
        normalize_timestamp(&mut minutes);
        assert_eq!(minutes["timestamp"], "2024-01-01T10:00:00.000000Z");
    }

    #[test]
    fn inputs_accept_objects_and_json_text() {
        assert!(LogInput::from(json!({"a": 1})).into_document().is_ok());
        assert!(LogInput::from(r#"{"a": 1}"#).into_document().is_ok());
        assert!(LogInput::from("[1, 2]").into_document().is_err());
        assert!(LogInput::from("{broken").into_document().is_err());
    }

    #[test]
    fn parse_log_file_wraps_plain_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.log");
        fs::write(&path, "{\"message\": \"json\"}\n\nplain text line\n").unwrap();

        let entries = logger(QuickwitConfig::default()).parse_log_file(&path);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["message"], "json");
        assert_eq!(entries[1]["message"], "plain text line");
        assert_eq!(entries[1]["line_number"], 3);
        assert!(entries[1].contains_key("file"));
    }

    #[tokio::test]
    async fn disabled_features_short_circuit() {
        let config = QuickwitConfig {
            enable_quickwit_indexing: false,
            enable_minio_uploads: false,
            ..QuickwitConfig::default()
        };
        let logger = logger(config);
        assert!(logger.send_log("{broken", CommitMode::Auto).await);
        assert!(logger.send_logs_batch(vec![], CommitMode::Auto).await);

        let report = logger.upload_logs_to_minio(None).await;
        assert!(report.success);
        assert_eq!(report.files_processed, 0);
        assert_eq!(report.message.as_deref(), Some("MinIO uploads disabled in config"));
    }

    #[tokio::test]
    async fn invalid_json_is_rejected_before_any_request() {
        let logger = logger(QuickwitConfig::default());
        assert!(!logger.send_log("not json", CommitMode::Auto).await);
        assert!(!logger
            .send_logs_batch(vec!["nope".into(), "[]".into()], CommitMode::Auto)
            .await);
    }
}
