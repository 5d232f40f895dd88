use crate::config::QuickwitConfig;
use crate::index_config::index_config_for;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HEALTH_PATHS: [&str; 2] = ["/health/livez", "/health/readyz"];
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Commit behaviour requested on ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Documents become searchable on the next scheduled commit.
    #[default]
    Auto,
    /// Wait for the next scheduled commit before answering.
    WaitFor,
    /// Force a commit right after ingest.
    Force,
}

impl CommitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitMode::Auto => "auto",
            CommitMode::WaitFor => "wait_for",
            CommitMode::Force => "force",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum QuickwitError {
    #[error("failed to connect to Quickwit at {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("Quickwit API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to serialize documents: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Whether [`QuickwitClient::create_log_index`] found or created the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Existing,
    Created,
}

/// Parameters of a search request. Only `query` is required.
///
/// The query language is Quickwit's, e.g. `level:ERROR AND message:timeout`.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub max_hits: Option<u64>,
    pub start_offset: Option<u64>,
    /// Unix seconds, inclusive.
    pub start_timestamp: Option<i64>,
    /// Unix seconds, exclusive.
    pub end_timestamp: Option<i64>,
    /// Field to sort on; prefix with `-` for descending order.
    pub sort_by: Option<String>,
    pub search_fields: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        SearchRequest {
            query: query.into(),
            ..Default::default()
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("query", self.query.clone())];
        if let Some(max_hits) = self.max_hits {
            pairs.push(("max_hits", max_hits.to_string()));
        }
        if let Some(offset) = self.start_offset {
            pairs.push(("start_offset", offset.to_string()));
        }
        if let Some(start) = self.start_timestamp {
            pairs.push(("start_timestamp", start.to_string()));
        }
        if let Some(end) = self.end_timestamp {
            pairs.push(("end_timestamp", end.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sort_by", sort_by.clone()));
        }
        if !self.search_fields.is_empty() {
            pairs.push(("search_field", self.search_fields.join(",")));
        }
        pairs
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub num_hits: u64,
    #[serde(default)]
    pub hits: Vec<Value>,
    #[serde(default)]
    pub elapsed_time_micros: u64,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Body of a delete task: every document matching `query` is deleted
/// asynchronously by Quickwit's janitor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteQuery {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_field: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,
}

/// Thin client for the Quickwit REST API (`/api/v1`).
#[derive(Clone)]
pub struct QuickwitClient {
    client: Client,
    server_url: String,
    api_url: String,
    index_prefix: String,
    index_template: Option<Value>,
    known_indexes: Arc<Mutex<HashSet<String>>>,
}

impl QuickwitClient {
    pub fn new(config: &QuickwitConfig) -> Result<Self, QuickwitError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(client, config))
    }

    /// Build on top of an existing `reqwest` client.
    pub fn with_client(client: Client, config: &QuickwitConfig) -> Self {
        let server_url = config.url.trim_end_matches('/').to_string();
        QuickwitClient {
            client,
            api_url: format!("{}/api/v1", server_url),
            server_url,
            index_prefix: config.index_prefix.clone(),
            index_template: config.index_config.clone(),
            known_indexes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn index_id_for(&self, app_name: &str) -> String {
        format!("{}_{}", self.index_prefix, app_name)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn index_path(index_id: &str) -> String {
        urlencoding::encode(index_id).into_owned()
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, QuickwitError> {
        let resp = builder
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        if status == StatusCode::NOT_FOUND {
            Err(QuickwitError::IndexNotFound(body))
        } else {
            Err(QuickwitError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> QuickwitError {
        if e.is_connect() {
            QuickwitError::Connection {
                url: self.api_url.clone(),
                source: e,
            }
        } else {
            QuickwitError::Request(e)
        }
    }

    /// `true` as soon as the liveness or readiness probe answers 200.
    /// Never fails.
    pub async fn health_check(&self) -> bool {
        for path in HEALTH_PATHS {
            let url = format!("{}{}", self.server_url, path);
            match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => return true,
                Ok(resp) => tracing::debug!(%url, status = %resp.status(), "health probe failed"),
                Err(e) => tracing::debug!(%url, error = %e, "health probe unreachable"),
            }
        }
        false
    }

    pub async fn list_indexes(&self) -> Result<Vec<Value>, QuickwitError> {
        let resp = self.execute(self.client.get(self.url("indexes"))).await?;
        Ok(resp.json().await?)
    }

    /// Create an index from a full Quickwit index config.
    pub async fn create_index(&self, index_config: &Value) -> Result<(), QuickwitError> {
        let resp = self
            .execute(self.client.post(self.url("indexes")).json(index_config))
            .await;
        match resp {
            Ok(_) => {
                if let Some(id) = index_config.get("index_id").and_then(Value::as_str) {
                    self.remember(id);
                    tracing::info!(index_id = id, "created index");
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to create index");
                Err(e)
            }
        }
    }

    pub async fn delete_index(&self, index_id: &str) -> Result<(), QuickwitError> {
        let url = self.url(&format!("indexes/{}", Self::index_path(index_id)));
        self.execute(self.client.delete(url)).await.map_err(|e| {
            tracing::error!(index_id, error = %e, "failed to delete index");
            e
        })?;
        self.forget(index_id);
        tracing::info!(index_id, "deleted index");
        Ok(())
    }

    /// Delete every split of the index and reset its source checkpoints.
    pub async fn clear_index(&self, index_id: &str) -> Result<(), QuickwitError> {
        let url = self.url(&format!("indexes/{}/clear", Self::index_path(index_id)));
        self.execute(self.client.put(url)).await.map_err(|e| {
            tracing::error!(index_id, error = %e, "failed to clear index");
            e
        })?;
        tracing::info!(index_id, "cleared index");
        Ok(())
    }

    /// Index statistics from `/indexes/{id}/describe`.
    pub async fn get_index_stats(&self, index_id: &str) -> Result<Value, QuickwitError> {
        let url = self.url(&format!("indexes/{}/describe", Self::index_path(index_id)));
        let resp = self.execute(self.client.get(url)).await?;
        Ok(resp.json().await?)
    }

    pub async fn index_exists(&self, index_id: &str) -> Result<bool, QuickwitError> {
        match self.get_index_stats(index_id).await {
            Ok(_) => Ok(true),
            Err(QuickwitError::IndexNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Make sure the log index of `app_name` exists, creating it from the
    /// configured template when Quickwit reports it missing.
    ///
    /// Indexes seen once are cached, so the batching path only pays for the
    /// describe call on its first flush.
    pub async fn create_log_index(&self, app_name: &str) -> Result<IndexStatus, QuickwitError> {
        let index_id = self.index_id_for(app_name);
        if self.is_known(&index_id) {
            return Ok(IndexStatus::Existing);
        }

        if self.index_exists(&index_id).await? {
            tracing::debug!(index_id = %index_id, "index already exists");
            self.remember(&index_id);
            return Ok(IndexStatus::Existing);
        }

        let config = index_config_for(&index_id, self.index_template.as_ref());
        self.create_index(&config).await?;
        self.remember(&index_id);
        Ok(IndexStatus::Created)
    }

    /// Ingest documents as one NDJSON payload. An empty slice sends nothing.
    pub async fn index_documents<T: Serialize>(
        &self,
        index_id: &str,
        documents: &[T],
        commit: CommitMode,
    ) -> Result<(), QuickwitError> {
        if documents.is_empty() {
            return Ok(());
        }

        let payload = to_ndjson(documents)?;
        self.ingest_payload(index_id, payload, commit).await?;
        tracing::debug!(index_id, count = documents.len(), "indexed documents");
        Ok(())
    }

    pub async fn index_document<T: Serialize>(
        &self,
        index_id: &str,
        document: &T,
        commit: CommitMode,
    ) -> Result<(), QuickwitError> {
        self.index_documents(index_id, std::slice::from_ref(document), commit)
            .await
    }

    /// Ingest an NDJSON file as-is.
    pub async fn ingest_file(&self, index_id: &str, path: impl AsRef<Path>, commit: CommitMode) -> Result<(), QuickwitError> {
        let path = path.as_ref();
        let payload = tokio::fs::read(path).await.map_err(|source| QuickwitError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.ingest_payload(index_id, payload, commit).await?;
        tracing::info!(index_id, path = %path.display(), "ingested file");
        Ok(())
    }

    async fn ingest_payload(&self, index_id: &str, payload: Vec<u8>, commit: CommitMode) -> Result<(), QuickwitError> {
        let url = self.url(&format!("{}/ingest", Self::index_path(index_id)));
        let request = self
            .client
            .post(url)
            .query(&[("commit", commit.as_str())])
            .header("Content-Type", "application/x-ndjson")
            .body(payload);

        self.execute(request).await.map_err(|e| {
            // Deleted behind our back; check and recreate it on the next call.
            if matches!(e, QuickwitError::IndexNotFound(_)) {
                self.forget(index_id);
            }
            tracing::error!(index_id, error = %e, "failed to ingest documents");
            e
        })?;
        Ok(())
    }

    pub async fn search(&self, index_id: &str, request: &SearchRequest) -> Result<SearchResponse, QuickwitError> {
        let url = self.url(&format!("{}/search", Self::index_path(index_id)));
        let resp = self
            .execute(self.client.get(url).query(&request.query_pairs()))
            .await?;
        Ok(resp.json().await?)
    }

    /// Queue a delete task. Deletion happens eventually, on Quickwit's side.
    pub async fn create_delete_task(&self, index_id: &str, query: &DeleteQuery) -> Result<Value, QuickwitError> {
        let url = self.url(&format!("indexes/{}/delete-tasks", Self::index_path(index_id)));
        let resp = self.execute(self.client.post(url).json(query)).await.map_err(|e| {
            tracing::error!(index_id, error = %e, "failed to create delete task");
            e
        })?;
        tracing::info!(index_id, query = %query.query, "created delete task");
        Ok(resp.json().await.unwrap_or(Value::Null))
    }

    fn is_known(&self, index_id: &str) -> bool {
        self.known_indexes
            .lock()
            .map(|known| known.contains(index_id))
            .unwrap_or(false)
    }

    fn remember(&self, index_id: &str) {
        if let Ok(mut known) = self.known_indexes.lock() {
            known.insert(index_id.to_string());
        }
    }

    fn forget(&self, index_id: &str) {
        if let Ok(mut known) = self.known_indexes.lock() {
            known.remove(index_id);
        }
    }
}

/// Serialize documents as newline-delimited JSON, one per line, with a
/// trailing newline.
pub fn to_ndjson<T: Serialize>(documents: &[T]) -> Result<Vec<u8>, serde_json::Error> {
    let mut payload = Vec::with_capacity(documents.len() * 256);
    for doc in documents {
        serde_json::to_writer(&mut payload, doc)?;
        payload.push(b'\n');
    }
    Ok(payload)
}
