use super::{ObjectInfo, ObjectStore, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

struct StoredObject {
    body: Vec<u8>,
    content_type: String,
    last_modified: String,
}

/// Object store kept in process memory.
///
/// Backs tests that should not touch a real bucket.
pub struct InMemoryObjectStore {
    bucket_exists: AtomicBool,
    fail_uploads: AtomicBool,
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        InMemoryObjectStore {
            bucket_exists: AtomicBool::new(true),
            fail_uploads: AtomicBool::new(false),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    /// A store whose bucket still has to be created.
    pub fn without_bucket() -> Self {
        let store = Self::new();
        store.bucket_exists.store(false, Ordering::SeqCst);
        store
    }

    /// Make every subsequent `put_object` fail.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).map(|o| o.body.clone()))
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).map(|o| o.content_type.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        Ok(self.bucket_exists.load(Ordering::SeqCst))
    }

    async fn create_bucket(&self) -> Result<(), StorageError> {
        self.bucket_exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        if !self.bucket_exists.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("bucket does not exist".to_string()));
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("refusing to store {}", key)));
        }
        let mut objects = self.objects.lock().map_err(|_| poisoned())?;
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                last_modified: Utc::now().to_rfc3339(),
            },
        );
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let objects = self.objects.lock().map_err(|_| poisoned())?;
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                name: key.clone(),
                size: object.body.len() as u64,
                last_modified: object.last_modified.clone(),
                etag: None,
            })
            .collect())
    }
}
