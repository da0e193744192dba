//! S3-based profile photo storage
mod error;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{presigning::PresigningConfig, primitives::ByteStream, Client as S3Client};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub use error::{BucketError, BucketResult};

/// Prefix under which every profile photo is stored
const PHOTO_KEY_PREFIX: &str = "profile-photos";

/// Presigned URL with expiration information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    /// The presigned URL for GET operations
    pub url: String,
    /// UTC timestamp when the URL expires
    pub expires_at: DateTime<Utc>,
}

/// A photo file submitted for upload
#[derive(Debug, Clone)]
pub struct PhotoFile {
    /// Name of the file on the uploader's device
    pub file_name: String,
    /// MIME type declared by the uploader
    pub content_type: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

impl PhotoFile {
    /// Checks the declared type and size and returns the file extension to store under
    ///
    /// # Errors
    ///
    /// Returns `BucketError::InvalidInput` if the file is empty, larger than
    /// `max_bytes`, or not a supported image type
    pub fn validate(&self, max_bytes: usize) -> BucketResult<&'static str> {
        if self.bytes.is_empty() {
            return Err(BucketError::InvalidInput("photo is empty".to_string()));
        }
        if self.bytes.len() > max_bytes {
            return Err(BucketError::InvalidInput(format!(
                "photo is {} bytes, limit is {max_bytes}",
                self.bytes.len()
            )));
        }

        let parsed: mime::Mime = self.content_type.parse().map_err(|_| {
            BucketError::InvalidInput(format!("invalid content type: {}", self.content_type))
        })?;
        if parsed.type_() != mime::IMAGE {
            return Err(BucketError::InvalidInput(format!(
                "unsupported content type: {parsed}"
            )));
        }

        match parsed.subtype().as_str() {
            "jpeg" => Ok("jpg"),
            "png" => Ok("png"),
            "gif" => Ok("gif"),
            "webp" => Ok("webp"),
            _ => Err(BucketError::InvalidInput(format!(
                "unsupported content type: {parsed}"
            ))),
        }
    }
}

/// A photo that has been durably stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPhoto {
    /// Durable public reference of the stored object
    pub reference: String,
    /// Original file name, for display
    pub display_name: String,
}

/// Object storage for profile photos
///
/// Every upload produces a fresh reference. Deleting a reference that no
/// longer exists is not an error.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Stores a photo and returns its durable reference
    async fn upload(&self, file: PhotoFile) -> BucketResult<UploadedPhoto>;

    /// Deletes the object behind a reference previously returned by `upload`
    async fn delete(&self, reference: &str) -> BucketResult<()>;
}

/// Issues time-limited read URLs for stored photos
#[async_trait]
pub trait PhotoUrlSigner: Send + Sync {
    /// Maps a public reference to the storage path it lives under
    fn storage_path(&self, reference: &str) -> Option<String>;

    /// Generates a presigned GET URL for a storage path
    async fn presign_get(&self, path: &str) -> BucketResult<PresignedUrl>;
}

/// Photo storage client for S3 operations
pub struct MediaStorage {
    s3_client: Arc<S3Client>,
    bucket_name: String,
    public_base_url: String,
    presigned_url_expiry_secs: u64,
}

impl MediaStorage {
    /// Creates a new media storage client
    ///
    /// # Arguments
    ///
    /// * `s3_client` - Pre-configured S3 client
    /// * `bucket_name` - S3 bucket name for photo storage
    /// * `public_base_url` - URL prefix under which stored objects are publicly addressed
    /// * `presigned_url_expiry_secs` - Lifetime of presigned GET URLs in seconds
    #[must_use]
    pub fn new(
        s3_client: Arc<S3Client>,
        bucket_name: String,
        public_base_url: &str,
        presigned_url_expiry_secs: u64,
    ) -> Self {
        Self {
            s3_client,
            bucket_name,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            presigned_url_expiry_secs,
        }
    }

    /// Builds a unique S3 key for a new photo
    #[must_use]
    pub fn new_photo_key(extension: &str) -> String {
        format!("{PHOTO_KEY_PREFIX}/{}.{extension}", uuid::Uuid::new_v4())
    }

    /// Public reference for an S3 key
    #[must_use]
    pub fn reference_for_key(&self, s3_key: &str) -> String {
        format!("{}/{s3_key}", self.public_base_url)
    }

    /// Extracts the S3 key from a public reference
    ///
    /// Returns `None` for references that do not point into this bucket.
    #[must_use]
    pub fn key_from_reference(&self, reference: &str) -> Option<String> {
        reference
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| {
                key.strip_prefix(PHOTO_KEY_PREFIX)
                    .is_some_and(|rest| rest.starts_with('/'))
            })
            .map(ToString::to_string)
    }
}

#[async_trait]
impl PhotoStore for MediaStorage {
    async fn upload(&self, file: PhotoFile) -> BucketResult<UploadedPhoto> {
        let extension = file.validate(usize::MAX)?;
        let s3_key = Self::new_photo_key(extension);
        let content_length = i64::try_from(file.bytes.len())
            .map_err(|_| BucketError::InvalidInput("photo too large".to_string()))?;

        debug!("Uploading photo {} as {}", file.file_name, s3_key);

        self.s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&s3_key)
            .content_type(&file.content_type)
            .content_length(content_length)
            .body(ByteStream::from(file.bytes))
            .send()
            .await?;

        info!("Stored photo {}", s3_key);

        Ok(UploadedPhoto {
            reference: self.reference_for_key(&s3_key),
            display_name: file.file_name,
        })
    }

    async fn delete(&self, reference: &str) -> BucketResult<()> {
        let s3_key = self.key_from_reference(reference).ok_or_else(|| {
            BucketError::InvalidInput(format!("not a stored photo reference: {reference}"))
        })?;

        self.s3_client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&s3_key)
            .send()
            .await?;

        info!("Deleted photo {}", s3_key);
        Ok(())
    }
}

#[async_trait]
impl PhotoUrlSigner for MediaStorage {
    fn storage_path(&self, reference: &str) -> Option<String> {
        self.key_from_reference(reference)
    }

    async fn presign_get(&self, path: &str) -> BucketResult<PresignedUrl> {
        let presigned_config =
            PresigningConfig::expires_in(Duration::from_secs(self.presigned_url_expiry_secs))
                .map_err(|e| {
                    BucketError::ConfigError(format!("Failed to create presigning config: {e}"))
                })?;

        let presigned_url = self
            .s3_client
            .get_object()
            .bucket(&self.bucket_name)
            .key(path)
            .presigned(presigned_config)
            .await
            .map_err(|e| BucketError::S3Error(format!("Failed to generate presigned URL: {e}")))?;

        let expires_at: DateTime<Utc> =
            Utc::now() + Duration::from_secs(self.presigned_url_expiry_secs);

        debug!("Generated presigned URL for {} expires at {}", path, expires_at);

        Ok(PresignedUrl {
            url: presigned_url.uri().to_string(),
            expires_at,
        })
    }
}

/// In-memory storage used by tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::sync::{Notify, Semaphore};

    use super::{
        BucketError, BucketResult, PhotoFile, PhotoStore, PhotoUrlSigner, PresignedUrl,
        UploadedPhoto,
    };

    /// Prefix of references handed out by the in-memory store
    pub const MOCK_BASE_URL: &str = "mem://photos";

    /// Photo store that keeps objects in memory and records every call
    #[derive(Default)]
    pub struct InMemoryPhotoStore {
        objects: Mutex<HashSet<String>>,
        uploads: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
        next_references: Mutex<VecDeque<String>>,
        counter: AtomicUsize,
        fail_uploads: AtomicBool,
        fail_deletes: AtomicBool,
        gate: Option<Arc<Semaphore>>,
        upload_started: Arc<Notify>,
    }

    impl InMemoryPhotoStore {
        /// Creates an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a store whose uploads wait until `release_upload` is called
        #[must_use]
        pub fn gated() -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Self::default()
            }
        }

        /// Queues the references the next uploads will produce
        #[must_use]
        pub fn with_references<I, S>(self, references: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.next_references
                .lock()
                .unwrap()
                .extend(references.into_iter().map(Into::into));
            self
        }

        /// Places an object in the store as if it had been uploaded earlier
        pub fn seed(&self, reference: &str) {
            self.objects.lock().unwrap().insert(reference.to_string());
        }

        /// Lets one waiting upload complete
        ///
        /// # Panics
        ///
        /// Panics if the store was not created with `gated`
        pub fn release_upload(&self) {
            self.gate
                .as_ref()
                .expect("store is not gated")
                .add_permits(1);
        }

        /// Resolves once an upload has been issued
        pub async fn wait_for_upload_start(&self) {
            self.upload_started.notified().await;
        }

        /// Makes subsequent uploads fail
        pub fn fail_uploads(&self, fail: bool) {
            self.fail_uploads.store(fail, Ordering::SeqCst);
        }

        /// Makes subsequent deletes fail
        pub fn fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, Ordering::SeqCst);
        }

        /// References of every successful upload, in order
        #[must_use]
        pub fn uploads(&self) -> Vec<String> {
            self.uploads.lock().unwrap().clone()
        }

        /// References of every delete call, in order, including failed ones
        #[must_use]
        pub fn deletes(&self) -> Vec<String> {
            self.deletes.lock().unwrap().clone()
        }

        /// Whether an object is currently stored
        #[must_use]
        pub fn contains(&self, reference: &str) -> bool {
            self.objects.lock().unwrap().contains(reference)
        }
    }

    #[async_trait]
    impl PhotoStore for InMemoryPhotoStore {
        async fn upload(&self, file: PhotoFile) -> BucketResult<UploadedPhoto> {
            self.upload_started.notify_one();
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| BucketError::AwsError(e.to_string()))?
                    .forget();
            }

            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(BucketError::UpstreamError("upload rejected".to_string()));
            }

            let reference = self.next_references.lock().unwrap().pop_front().unwrap_or_else(|| {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!("{MOCK_BASE_URL}/profile-photos/{n}")
            });

            self.objects.lock().unwrap().insert(reference.clone());
            self.uploads.lock().unwrap().push(reference.clone());

            Ok(UploadedPhoto {
                reference,
                display_name: file.file_name,
            })
        }

        async fn delete(&self, reference: &str) -> BucketResult<()> {
            self.deletes.lock().unwrap().push(reference.to_string());
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(BucketError::UpstreamError("delete rejected".to_string()));
            }
            self.objects.lock().unwrap().remove(reference);
            Ok(())
        }
    }

    /// Signer that issues predictable URLs and counts how often it was asked
    pub struct CountingUrlSigner {
        lifetime: chrono::Duration,
        now: Mutex<DateTime<Utc>>,
        calls: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
        sign_started: Arc<Notify>,
    }

    impl CountingUrlSigner {
        /// Creates a signer whose URLs live for `lifetime` from its clock
        #[must_use]
        pub fn new(lifetime: chrono::Duration, now: DateTime<Utc>) -> Self {
            Self {
                lifetime,
                now: Mutex::new(now),
                calls: AtomicUsize::new(0),
                gate: None,
                sign_started: Arc::new(Notify::new()),
            }
        }

        /// Creates a signer that waits in `presign_get` until `release_sign` is called
        #[must_use]
        pub fn gated(lifetime: chrono::Duration, now: DateTime<Utc>) -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Self::new(lifetime, now)
            }
        }

        /// Lets one waiting signature complete
        ///
        /// # Panics
        ///
        /// Panics if the signer was not created with `gated`
        pub fn release_sign(&self) {
            self.gate
                .as_ref()
                .expect("signer is not gated")
                .add_permits(1);
        }

        /// Resolves once a signature has been requested
        pub async fn wait_for_sign_start(&self) {
            self.sign_started.notified().await;
        }

        /// Moves the signer's clock
        pub fn set_now(&self, now: DateTime<Utc>) {
            *self.now.lock().unwrap() = now;
        }

        /// Number of URLs issued so far
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PhotoUrlSigner for CountingUrlSigner {
        fn storage_path(&self, reference: &str) -> Option<String> {
            reference
                .strip_prefix(MOCK_BASE_URL)
                .and_then(|rest| rest.strip_prefix('/'))
                .map(ToString::to_string)
        }

        async fn presign_get(&self, path: &str) -> BucketResult<PresignedUrl> {
            self.sign_started.notify_one();
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| BucketError::AwsError(e.to_string()))?
                    .forget();
            }

            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now = *self.now.lock().unwrap();
            Ok(PresignedUrl {
                url: format!("https://signed.test/{path}?sig={n}"),
                expires_at: now + self.lifetime,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aws_sdk_s3::config::{BehaviorVersion, Region};
    use pretty_assertions::assert_eq;

    use super::*;

    fn photo(content_type: &str, size: usize) -> PhotoFile {
        PhotoFile {
            file_name: "grandmother.jpg".to_string(),
            content_type: content_type.to_string(),
            bytes: vec![7; size],
        }
    }

    fn storage() -> MediaStorage {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        MediaStorage::new(
            Arc::new(S3Client::from_conf(config)),
            "photos".to_string(),
            "https://cdn.example.org/photos/",
            3600,
        )
    }

    #[test]
    fn test_validate_accepts_supported_images() {
        assert_eq!(photo("image/jpeg", 10).validate(100).unwrap(), "jpg");
        assert_eq!(photo("image/png", 10).validate(100).unwrap(), "png");
        assert_eq!(photo("image/webp", 10).validate(100).unwrap(), "webp");
        assert_eq!(photo("image/gif", 100).validate(100).unwrap(), "gif");
    }

    #[test]
    fn test_validate_rejects_bad_files() {
        assert!(matches!(
            photo("image/jpeg", 0).validate(100),
            Err(BucketError::InvalidInput(_))
        ));
        assert!(matches!(
            photo("image/jpeg", 101).validate(100),
            Err(BucketError::InvalidInput(_))
        ));
        assert!(matches!(
            photo("application/pdf", 10).validate(100),
            Err(BucketError::InvalidInput(_))
        ));
        assert!(matches!(
            photo("image/tiff", 10).validate(100),
            Err(BucketError::InvalidInput(_))
        ));
        assert!(matches!(
            photo("not a mime", 10).validate(100),
            Err(BucketError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_photo_keys_are_unique() {
        let first = MediaStorage::new_photo_key("jpg");
        let second = MediaStorage::new_photo_key("jpg");

        assert!(first.starts_with("profile-photos/"));
        assert!(first.ends_with(".jpg"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_reference_key_mapping() {
        let storage = storage();
        let reference = storage.reference_for_key("profile-photos/abc.png");

        assert_eq!(
            reference,
            "https://cdn.example.org/photos/profile-photos/abc.png"
        );
        assert_eq!(
            storage.key_from_reference(&reference).as_deref(),
            Some("profile-photos/abc.png")
        );
        assert_eq!(
            storage.key_from_reference("https://elsewhere.example/profile-photos/abc.png"),
            None
        );
        assert_eq!(
            storage.key_from_reference("https://cdn.example.org/photos/other/abc.png"),
            None
        );
        assert_eq!(
            storage.key_from_reference("https://cdn.example.org/photos/profile-photosX/abc.png"),
            None
        );
    }
}
