use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// StorageError
///
/// Failure reported by the blob store. A missing object is *not* an error;
/// `get_object` returns `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{0}")]
    Backend(String),
}

// 1. StorageService Contract
/// StorageService
///
/// The blob store behind file attachments. Handlers only see this trait, so the
/// S3 client in production and the in-memory mock in tests are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in the `Env::Local` setup to
    /// provision the bucket in MinIO.
    async fn ensure_bucket_exists(&self);

    /// Stores `bytes` under `key`, replacing any previous object.
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Reads an object back. `Ok(None)` when the key does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Removes an object. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// AWS SDK client pointed at any S3-compatible endpoint (MinIO locally).
/// `force_path_style(true)` is required for MinIO.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        let client = s3::Client::from_conf(config);

        Self {
            client,
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_bucket_exists
    ///
    /// CreateBucket on an existing bucket fails harmlessly, so the result is ignored.
    async fn ensure_bucket_exists(&self) {
        let _ = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Ok(None);
                }
                return Err(StorageError::Backend(err.to_string()));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(Some(data.into_bytes().to_vec()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a user-supplied filename can never
/// climb out of its parent folder.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// The last usable path component of a client-supplied filename.
pub fn clean_filename(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .map(str::trim)
        .find(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("upload")
        .to_string()
}

/// object_key
///
/// `<folder>/<filename>`; one folder per parent record.
pub fn object_key(folder: &str, filename: &str) -> String {
    sanitize_key(&format!("{folder}/{}", clean_filename(filename)))
}

// 3. The Mock Implementation (For Unit Tests)
/// MockStorageService
///
/// Keeps blobs in a shared map. Clones share the same map, so a test can hold
/// one handle while the app state owns another.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every write/read/delete returns a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|m| m.contains_key(&sanitize_key(key)))
            .unwrap_or(false)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        Ok(())
    }

    fn poisoned() -> StorageError {
        StorageError::Backend("Mock storage lock poisoned".to_string())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {
        // No-op in mock environment.
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.objects
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(sanitize_key(key), bytes);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check()?;
        let objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        Ok(objects.get(&sanitize_key(key)).cloned())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.objects
            .lock()
            .map_err(|_| Self::poisoned())?
            .remove(&sanitize_key(key));
        Ok(())
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_key_strips_traversal_segments() {
        assert_eq!(sanitize_key("deliveries/../../etc/passwd"), "deliveries/etc/passwd");
        assert_eq!(sanitize_key("/nces//./a.pdf"), "nces/a.pdf");
    }

    #[test]
    fn object_key_keeps_only_the_file_name() {
        assert_eq!(object_key("deliveries/42", "report.pdf"), "deliveries/42/report.pdf");
        assert_eq!(object_key("deliveries/42", "../../secret.txt"), "deliveries/42/secret.txt");
        assert_eq!(object_key("nces/7", "C:\\tmp\\photo.png"), "nces/7/photo.png");
        assert_eq!(object_key("nces/7", ".."), "nces/7/upload");
    }
}
