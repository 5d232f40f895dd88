use super::{ObjectInfo, ObjectStore, StorageError};
use crate::config::MinioConfig;
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::region::Region;
use s3::{Bucket, BucketConfiguration};

/// S3 client for MinIO, using path-style addressing
/// (`http://host:port/bucket/key`).
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    name: String,
    region: Region,
    credentials: Credentials,
}

impl S3ObjectStore {
    pub fn new(config: &MinioConfig) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.base_url(),
        };

        let credentials = match (config.access_key.as_deref(), config.secret_key.as_deref()) {
            (Some(access), Some(secret)) => Credentials::new(Some(access), Some(secret), None, None, None),
            _ => Credentials::anonymous(),
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let bucket = Bucket::new(&config.bucket_name, region.clone(), credentials.clone())
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .with_path_style();

        Ok(S3ObjectStore {
            bucket,
            name: config.bucket_name.clone(),
            region,
            credentials,
        })
    }
}

fn backend(e: s3::error::S3Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        self.bucket.exists().await.map_err(backend)
    }

    async fn create_bucket(&self) -> Result<(), StorageError> {
        Bucket::create_with_path_style(
            &self.name,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.bucket
            .put_object_with_content_type(key, &body, content_type)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .await
            .map_err(backend)?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| ObjectInfo {
                name: object.key,
                size: object.size,
                last_modified: object.last_modified,
                etag: object.e_tag,
            })
            .collect())
    }
}
