//! Blob-store capability interface.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use url::Url;

use crate::error::StorageError;

/// Readable byte stream over one blob.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// HTTP method a presigned URL is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresignMethod {
    /// Download.
    Get,
    /// Upload.
    Put,
}

impl PresignMethod {
    /// HTTP verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresignMethod::Get => "GET",
            PresignMethod::Put => "PUT",
        }
    }
}

/// Entry returned by a list operation.
///
/// A `size` of `None` marks a common prefix (a "directory" rolled up by a
/// delimited listing); its key ends in `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full object key.
    pub key: String,
    /// Object size in bytes, `None` for a common prefix.
    pub size: Option<u64>,
    /// Last modified timestamp (Unix epoch seconds).
    pub last_modified: Option<i64>,
    /// ETag, when the backend reports one.
    pub etag: Option<String>,
}

impl ObjectInfo {
    /// Entry for a stored object.
    pub fn file(key: impl Into<String>, size: u64, last_modified: Option<i64>) -> Self {
        Self {
            key: key.into(),
            size: Some(size),
            last_modified,
            etag: None,
        }
    }

    /// Entry for a common prefix.
    pub fn common_prefix(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            last_modified: None,
            etag: None,
        }
    }

    /// Whether this entry is a rolled-up prefix rather than an object.
    pub fn is_common_prefix(&self) -> bool {
        self.size.is_none()
    }
}

/// Object metadata from a HEAD-style lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub last_modified: Option<i64>,
    /// Content type.
    pub content_type: Option<String>,
    /// ETag.
    pub etag: Option<String>,
}

/// Low-level blob operations - implemented by each backend.
///
/// The artifact core depends only on this trait; vendor adapters (S3, Azure,
/// GCS, ...) live outside this workspace and are registered through
/// [`BlobStoreRegistry`](crate::BlobStoreRegistry).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Identifier this provider is registered under.
    fn provider_id(&self) -> &str;

    /// List objects whose key starts with `prefix`.
    ///
    /// With `recursive == false` the listing is delimited on `/`: objects
    /// directly beneath the prefix are returned, deeper objects are folded
    /// into common-prefix entries.
    ///
    /// # Arguments
    /// * `container` - Container name
    /// * `prefix` - Key prefix (empty or ending in `/` for directory listings)
    /// * `recursive` - Whether to descend into sub-prefixes
    ///
    /// # Errors
    /// `ContainerNotFound` when the container is missing, `AccessDenied` on
    /// authorization failures.
    async fn list(
        &self,
        container: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Whether any object key starts with `prefix`.
    ///
    /// Answered with one request returning at most one entry (a `max-keys=1`
    /// listing), whatever the number of matching objects.
    ///
    /// # Errors
    /// Same as [`list`](Self::list).
    async fn has_any(&self, container: &str, prefix: &str) -> Result<bool, StorageError>;

    /// Get metadata for one object.
    ///
    /// Returns None if the object doesn't exist.
    async fn get_metadata(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError>;

    /// Open a byte stream over one object.
    async fn open_read(&self, container: &str, key: &str) -> Result<BlobReader, StorageError>;

    /// Issue a time-limited URL granting direct `method` access to one object.
    ///
    /// # Arguments
    /// * `container` - Container name
    /// * `key` - Object key
    /// * `method` - GET for downloads, PUT for uploads
    /// * `ttl` - How long the URL stays valid
    async fn presign(
        &self,
        container: &str,
        key: &str,
        method: PresignMethod,
        ttl: Duration,
    ) -> Result<Url, StorageError>;
}
