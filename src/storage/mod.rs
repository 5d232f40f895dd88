//! Object storage for log files.
//!
//! [`MinioStorage`] implements the log specific operations (naming, directory
//! sync, object URLs) on top of any [`ObjectStore`]. The S3 implementation
//! talks to MinIO; the in-memory one backs tests.

mod memory;
#[cfg(feature = "minio")]
mod s3_store;

pub use memory::InMemoryObjectStore;
#[cfg(feature = "minio")]
pub use s3_store::S3ObjectStore;

use crate::config::MinioConfig;
use crate::daily_file::list_log_files;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("failed to connect to object storage: {0}")]
    Connection(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("local file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object storage error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
    pub last_modified: String,
    pub etag: Option<String>,
}

/// Minimal bucket-scoped object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self) -> Result<bool, StorageError>;

    async fn create_bucket(&self) -> Result<(), StorageError>;

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Every object whose key starts with `prefix`, recursively.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError>;
}

/// Object name of an uploaded log file: `logs/{app}/{YYYY}/{MM}/{DD}/{file}`.
pub fn log_object_name(app_name: &str, file_name: &str, date: NaiveDate) -> String {
    format!("logs/{}/{}/{}", app_name, date.format("%Y/%m/%d"), file_name)
}

/// Log file storage in a MinIO bucket.
#[derive(Clone)]
pub struct MinioStorage {
    store: Arc<dyn ObjectStore>,
    endpoint: String,
    bucket: String,
    secure: bool,
}

impl MinioStorage {
    /// Wrap an existing store. The bucket is not checked.
    pub fn new(store: Arc<dyn ObjectStore>, config: &MinioConfig) -> Self {
        MinioStorage {
            store,
            endpoint: config.endpoint(),
            bucket: config.bucket_name.clone(),
            secure: config.secure,
        }
    }

    /// Connect to MinIO and create the bucket when it is missing.
    #[cfg(feature = "minio")]
    pub async fn connect(config: &MinioConfig) -> Result<Self, StorageError> {
        let store = S3ObjectStore::new(config)
            .map_err(|e| StorageError::Connection(format!("failed to initialize MinIO client: {}", e)))?;
        let storage = MinioStorage::new(Arc::new(store), config);
        storage.ensure_bucket().await?;
        Ok(storage)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        let exists = self
            .store
            .bucket_exists()
            .await
            .map_err(|e| StorageError::Connection(format!("bucket {}: {}", self.bucket, e)))?;
        if !exists {
            self.store
                .create_bucket()
                .await
                .map_err(|e| StorageError::Connection(format!("failed to create bucket {}: {}", self.bucket, e)))?;
            tracing::info!(bucket = %self.bucket, "created bucket");
        }
        Ok(())
    }

    /// `true` if the bucket is reachable. Never fails.
    pub async fn health_check(&self) -> bool {
        match self.store.bucket_exists().await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::debug!(bucket = %self.bucket, error = %e, "storage health check failed");
                false
            }
        }
    }

    pub fn object_url(&self, object_name: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}/{}/{}", scheme, self.endpoint, self.bucket, object_name)
    }

    /// Upload a local file and return its object URL.
    pub async fn upload_file(&self, local_path: &Path, object_name: &str, content_type: &str) -> Result<String, StorageError> {
        if !local_path.is_file() {
            return Err(StorageError::NotFound(local_path.to_path_buf()));
        }

        let body = tokio::fs::read(local_path).await.map_err(|source| StorageError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;

        self.store
            .put_object(object_name, body, content_type)
            .await
            .map_err(|e| StorageError::Upload(format!("{}: {}", local_path.display(), e)))?;

        let url = self.object_url(object_name);
        tracing::info!(path = %local_path.display(), %url, "uploaded file");
        Ok(url)
    }

    /// Objects under `prefix`. Failures are logged and yield an empty list.
    pub async fn list_objects(&self, prefix: &str) -> Vec<ObjectInfo> {
        match self.store.list_objects(prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::error!(prefix, error = %e, "failed to list objects");
                Vec::new()
            }
        }
    }

    /// Upload one log file under `logs/{app}/{YYYY}/{MM}/{DD}/`.
    pub async fn upload_log_file(&self, app_name: &str, log_file: &Path) -> Result<String, StorageError> {
        let file_name = log_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::NotFound(log_file.to_path_buf()))?;
        let object_name = log_object_name(app_name, &file_name, Utc::now().date_naive());
        self.upload_file(log_file, &object_name, JSON_CONTENT_TYPE).await
    }

    /// Upload every `*.json` and `*.log` file of `logs_dir`. Files that fail
    /// are logged and skipped.
    pub async fn sync_logs_directory(&self, app_name: &str, logs_dir: &Path) -> Vec<String> {
        let files = match list_log_files(logs_dir) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(dir = %logs_dir.display(), error = %e, "logs directory is not readable");
                return Vec::new();
            }
        };

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            match self.upload_log_file(app_name, &file).await {
                Ok(url) => uploaded.push(url),
                Err(e) => tracing::error!(path = %file.display(), error = %e, "failed to upload log file"),
            }
        }

        tracing::info!(app_name, count = uploaded.len(), "synced log files");
        uploaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn storage(store: Arc<InMemoryObjectStore>) -> MinioStorage {
        let config = MinioConfig {
            endpoint_url: "minio".into(),
            endpoint_port: Some(9000),
            bucket_name: "archive".into(),
            ..MinioConfig::default()
        };
        MinioStorage::new(store, &config)
    }

    #[test]
    fn object_names_are_grouped_by_app_and_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            log_object_name("shop", "shop_2024-01-05.json", date),
            "logs/shop/2024/01/05/shop_2024-01-05.json"
        );
    }

    #[tokio::test]
    async fn ensure_bucket_creates_missing_bucket() {
        let store = Arc::new(InMemoryObjectStore::without_bucket());
        let storage = storage(store.clone());
        assert!(!storage.health_check().await);

        storage.ensure_bucket().await.unwrap();
        assert!(storage.health_check().await);
    }

    #[tokio::test]
    async fn upload_returns_object_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop_2024-01-05.json");
        fs::write(&path, "{\"message\":\"hi\"}\n").unwrap();

        let store = Arc::new(InMemoryObjectStore::new());
        let storage = storage(store.clone());
        let url = storage
            .upload_file(&path, "logs/manual.json", JSON_CONTENT_TYPE)
            .await
            .unwrap();

        assert_eq!(url, "http://minio:9000/archive/logs/manual.json");
        assert_eq!(store.object("logs/manual.json").unwrap(), b"{\"message\":\"hi\"}\n");
    }

    #[tokio::test]
    async fn missing_local_file_is_an_error() {
        let storage = storage(Arc::new(InMemoryObjectStore::new()));
        let err = storage
            .upload_file(Path::new("/nonexistent/file.json"), "x", JSON_CONTENT_TYPE)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn sync_uploads_log_files_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "{}\n").unwrap();
        fs::write(dir.path().join("b.log"), "plain\n").unwrap();
        fs::write(dir.path().join("c.txt"), "ignored\n").unwrap();

        let store = Arc::new(InMemoryObjectStore::new());
        let storage = storage(store.clone());

        let urls = storage.sync_logs_directory("shop", dir.path()).await;
        assert_eq!(urls.len(), 2);
        let objects = storage.list_objects("logs/shop/").await;
        assert_eq!(objects.len(), 2);
        assert!(objects.iter().any(|o| o.name.ends_with("/a.json")));

        store.set_fail_uploads(true);
        assert!(storage.sync_logs_directory("shop", dir.path()).await.is_empty());
        assert!(storage
            .sync_logs_directory("shop", &dir.path().join("missing"))
            .await
            .is_empty());
    }
}
