//! In-memory blob store.
//!
//! Keeps objects in sorted maps per container and counts every call that a
//! networked backend would turn into a round trip, so callers can verify how
//! many requests a traversal issued.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use crate::error::StorageError;
use crate::traits::{BlobReader, BlobStore, ObjectInfo, ObjectMetadata, PresignMethod};
use crate::types::apply_delimiter;

/// Default provider identifier for [`MemoryBlobStore`].
pub const MEMORY_PROVIDER_ID: &str = "memory";

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    last_modified: i64,
}

/// Snapshot of the per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `list` and `has_any` calls.
    pub list: u64,
    pub get_metadata: u64,
    pub open_read: u64,
    pub presign: u64,
    /// Entries returned by listing calls, summed.
    pub listed_entries: u64,
}

impl CallCounts {
    /// Sum of all calls (`listed_entries` is not a call).
    pub fn total(&self) -> u64 {
        self.list + self.get_metadata + self.open_read + self.presign
    }
}

#[derive(Debug, Default)]
struct Counters {
    list: AtomicU64,
    get_metadata: AtomicU64,
    open_read: AtomicU64,
    presign: AtomicU64,
    listed_entries: AtomicU64,
}

/// Blob store held entirely in memory.
#[derive(Debug)]
pub struct MemoryBlobStore {
    id: String,
    containers: RwLock<HashMap<String, BTreeMap<String, MemoryObject>>>,
    denied: RwLock<HashSet<String>>,
    counters: Counters,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::with_id(MEMORY_PROVIDER_ID)
    }
}

impl MemoryBlobStore {
    /// Create a new empty store registered as `"memory"`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty store with a custom provider identifier.
    ///
    /// # Arguments
    /// * `id` - Provider identifier
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            containers: RwLock::new(HashMap::new()),
            denied: RwLock::new(HashSet::new()),
            counters: Counters::default(),
        }
    }

    /// Create an empty container (no-op if it already exists).
    pub fn create_container(&self, container: &str) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default();
    }

    /// Store an object, creating its container if needed.
    ///
    /// # Arguments
    /// * `container` - Container name
    /// * `key` - Object key
    /// * `data` - Object content
    /// * `last_modified` - Modification time (Unix epoch seconds)
    pub fn put(&self, container: &str, key: &str, data: impl Into<Vec<u8>>, last_modified: i64) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .insert(
                key.to_string(),
                MemoryObject {
                    data: data.into(),
                    last_modified,
                },
            );
    }

    /// Remove an object.
    ///
    /// # Returns
    /// True if the object existed.
    pub fn remove(&self, container: &str, key: &str) -> bool {
        self.containers
            .write()
            .get_mut(container)
            .map(|objects| objects.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Make every call against `container` fail with `AccessDenied`.
    pub fn deny_container(&self, container: &str) {
        self.denied.write().insert(container.to_string());
    }

    /// Current call counters.
    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            list: self.counters.list.load(Ordering::Relaxed),
            get_metadata: self.counters.get_metadata.load(Ordering::Relaxed),
            open_read: self.counters.open_read.load(Ordering::Relaxed),
            presign: self.counters.presign.load(Ordering::Relaxed),
            listed_entries: self.counters.listed_entries.load(Ordering::Relaxed),
        }
    }

    /// Reset all call counters to zero.
    pub fn reset_counts(&self) {
        self.counters.list.store(0, Ordering::Relaxed);
        self.counters.get_metadata.store(0, Ordering::Relaxed);
        self.counters.open_read.store(0, Ordering::Relaxed);
        self.counters.presign.store(0, Ordering::Relaxed);
        self.counters.listed_entries.store(0, Ordering::Relaxed);
    }

    fn check_access(&self, container: &str, key: &str) -> Result<(), StorageError> {
        if self.denied.read().contains(container) {
            return Err(StorageError::AccessDenied {
                container: container.to_string(),
                key: key.to_string(),
                message: "container is not readable with the supplied credentials".to_string(),
            });
        }
        Ok(())
    }

    fn container_missing(container: &str) -> StorageError {
        StorageError::ContainerNotFound {
            container: container.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn list(
        &self,
        container: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        self.counters.list.fetch_add(1, Ordering::Relaxed);
        self.check_access(container, prefix)?;

        let containers = self.containers.read();
        let objects: &BTreeMap<String, MemoryObject> = containers
            .get(container)
            .ok_or_else(|| Self::container_missing(container))?;

        let matching = objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| {
                ObjectInfo::file(key.clone(), object.data.len() as u64, Some(object.last_modified))
            });

        let entries: Vec<ObjectInfo> = if recursive {
            matching.collect()
        } else {
            apply_delimiter(prefix, matching)
        };
        self.counters
            .listed_entries
            .fetch_add(entries.len() as u64, Ordering::Relaxed);
        Ok(entries)
    }

    async fn has_any(&self, container: &str, prefix: &str) -> Result<bool, StorageError> {
        self.counters.list.fetch_add(1, Ordering::Relaxed);
        self.check_access(container, prefix)?;

        let containers = self.containers.read();
        let objects: &BTreeMap<String, MemoryObject> = containers
            .get(container)
            .ok_or_else(|| Self::container_missing(container))?;

        let found: bool = objects
            .range(prefix.to_string()..)
            .next()
            .map_or(false, |(key, _)| key.starts_with(prefix));
        if found {
            self.counters.listed_entries.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn get_metadata(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        self.counters.get_metadata.fetch_add(1, Ordering::Relaxed);
        self.check_access(container, key)?;

        let containers = self.containers.read();
        let objects: &BTreeMap<String, MemoryObject> = containers
            .get(container)
            .ok_or_else(|| Self::container_missing(container))?;

        Ok(objects.get(key).map(|object| ObjectMetadata {
            size: object.data.len() as u64,
            last_modified: Some(object.last_modified),
            content_type: None,
            etag: None,
        }))
    }

    async fn open_read(&self, container: &str, key: &str) -> Result<BlobReader, StorageError> {
        self.counters.open_read.fetch_add(1, Ordering::Relaxed);
        self.check_access(container, key)?;

        let containers = self.containers.read();
        let data: Vec<u8> = containers
            .get(container)
            .ok_or_else(|| Self::container_missing(container))?
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })?;

        Ok(Box::pin(Cursor::new(data)))
    }

    async fn presign(
        &self,
        container: &str,
        key: &str,
        method: PresignMethod,
        ttl: Duration,
    ) -> Result<Url, StorageError> {
        self.counters.presign.fetch_add(1, Ordering::Relaxed);
        self.check_access(container, key)?;

        let mut url: Url = Url::parse("memory:///").map_err(|e| StorageError::Other {
            message: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Other {
                message: "memory URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .push(container)
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("method", method.as_str())
            .append_pair("ttl", &ttl.as_secs().to_string());
        Ok(url)
    }
}
