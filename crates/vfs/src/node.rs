//! Nodes of the virtual file tree.
//!
//! A [`VirtualNode`] is a key plus the listing context it was created in. Its
//! kind, size and modification time are resolved on first access, from the
//! innermost covering cache frame when a scope is active and from the blob
//! store otherwise, then memoized for the lifetime of that node instance.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rusty_artifacts_storage::{
    BlobKey, BlobReader, BlobStore, ObjectInfo, ObjectMetadata, PresignMethod, StorageError,
};
use tokio::sync::OnceCell;
use url::Url;

use crate::cache::{CacheFrame, CachedEntry, FrameHit, ListingContext};
use crate::error::VfsError;
use crate::glob::GlobFilter;

/// What a key resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An object exists at exactly this key.
    File,
    /// No object at this key, but objects exist below it.
    Directory,
    /// Neither.
    Missing,
}

/// Resolved attributes of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeAttributes {
    kind: NodeKind,
    size: u64,
    last_modified: Option<i64>,
}

impl NodeAttributes {
    const DIRECTORY: NodeAttributes = NodeAttributes {
        kind: NodeKind::Directory,
        size: 0,
        last_modified: None,
    };

    const MISSING: NodeAttributes = NodeAttributes {
        kind: NodeKind::Missing,
        size: 0,
        last_modified: None,
    };

    fn file(size: u64, last_modified: Option<i64>) -> Self {
        Self {
            kind: NodeKind::File,
            size,
            last_modified,
        }
    }
}

/// One node of a read-only tree over a flat key space.
///
/// Construction is free: [`child`](Self::child) and [`parent`](Self::parent)
/// never touch the network. Attributes are resolved once per instance;
/// construct fresh nodes to observe later changes in the store.
pub struct VirtualNode {
    store: Arc<dyn BlobStore>,
    key: BlobKey,
    context: ListingContext,
    attributes: OnceCell<NodeAttributes>,
}

impl VirtualNode {
    pub(crate) fn new(store: Arc<dyn BlobStore>, key: BlobKey, context: ListingContext) -> Self {
        Self {
            store,
            key,
            context,
            attributes: OnceCell::new(),
        }
    }

    fn with_attributes(&self, key: BlobKey, attributes: NodeAttributes) -> Self {
        Self {
            store: self.store.clone(),
            key,
            context: self.context.clone(),
            attributes: OnceCell::new_with(Some(attributes)),
        }
    }

    // ========================================================================
    // Navigation (no I/O)
    // ========================================================================

    /// Final path segment of the key.
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// Slash-delimited path within the container.
    pub fn path(&self) -> &str {
        self.key.path()
    }

    /// Full key of the node.
    pub fn key(&self) -> &BlobKey {
        &self.key
    }

    /// Listing context the node resolves against.
    pub fn context(&self) -> &ListingContext {
        &self.context
    }

    /// Node for the key with its last segment stripped.
    ///
    /// The container root is its own parent.
    pub fn parent(&self) -> VirtualNode {
        Self::new(self.store.clone(), self.key.parent(), self.context.clone())
    }

    /// Node for `self/name`.
    ///
    /// # Arguments
    /// * `name` - Child segment name
    pub fn child(&self, name: &str) -> VirtualNode {
        Self::new(self.store.clone(), self.key.child(name), self.context.clone())
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Whether this node is a file, a directory, or missing.
    ///
    /// A key holding an object is a file even if other objects live below it.
    pub async fn kind(&self) -> Result<NodeKind, VfsError> {
        Ok(self.attributes().await?.kind)
    }

    /// True iff some object's key starts with this node's key plus `/`.
    pub async fn is_directory(&self) -> Result<bool, VfsError> {
        Ok(self.kind().await? == NodeKind::Directory)
    }

    /// True iff an object exists at exactly this key.
    pub async fn is_file(&self) -> Result<bool, VfsError> {
        Ok(self.kind().await? == NodeKind::File)
    }

    /// Whether the node is a file or a directory.
    pub async fn exists(&self) -> Result<bool, VfsError> {
        Ok(self.kind().await? != NodeKind::Missing)
    }

    /// Object size in bytes; 0 for a directory or missing node.
    pub async fn length(&self) -> Result<u64, VfsError> {
        Ok(self.attributes().await?.size)
    }

    /// Modification time in seconds since the Unix epoch; 0 for a directory
    /// or missing node.
    pub async fn last_modified(&self) -> Result<i64, VfsError> {
        Ok(self.attributes().await?.last_modified.unwrap_or(0))
    }

    async fn attributes(&self) -> Result<&NodeAttributes, VfsError> {
        self.attributes.get_or_try_init(|| self.resolve()).await
    }

    async fn resolve(&self) -> Result<NodeAttributes, VfsError> {
        if let Some(hit) = self.context.lookup(&self.key) {
            return Ok(resolve_in_frame(&hit));
        }

        tracing::trace!(key = %self.key, "Resolving node without a listing frame");

        let container: &str = self.key.container();
        let prefix: String = self.key.dir_prefix();
        let below = self.store.has_any(container, &prefix);

        // Issued concurrently; `has_any` returns at most one entry.
        let (metadata, below): (
            Result<Option<ObjectMetadata>, StorageError>,
            Result<bool, StorageError>,
        ) = if self.key.is_root() {
            (Ok(None), below.await)
        } else {
            tokio::join!(self.store.get_metadata(container, self.key.path()), below)
        };

        if let Some(metadata) = metadata.map_err(|e| self.storage_error(e))? {
            return Ok(NodeAttributes::file(metadata.size, metadata.last_modified));
        }
        if below.map_err(|e| self.storage_error(e))? {
            Ok(NodeAttributes::DIRECTORY)
        } else {
            Ok(NodeAttributes::MISSING)
        }
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Direct children: files and one-level subdirectories, each name once.
    ///
    /// Returned sorted by name. A missing node has no children.
    pub async fn list(&self) -> Result<Vec<VirtualNode>, VfsError> {
        if let Some(hit) = self.context.lookup(&self.key) {
            return Ok(hit
                .frame
                .children(&hit.rel)
                .iter()
                .map(|name| self.child(name))
                .collect());
        }

        tracing::trace!(key = %self.key, "Listing node without a listing frame");

        let prefix: String = self.key.dir_prefix();
        let entries: Vec<ObjectInfo> = self
            .store
            .list(self.key.container(), &prefix, false)
            .await
            .map_err(|e| self.storage_error(e))?;

        // The listing already tells files from prefixes; keep that.
        let mut children: BTreeMap<String, NodeAttributes> = BTreeMap::new();
        for entry in entries {
            let rest: &str = match entry.key.strip_prefix(prefix.as_str()) {
                Some(rest) => rest,
                None => continue,
            };
            let name: &str = rest.trim_end_matches('/');
            if name.is_empty() || name.contains('/') {
                continue;
            }
            let attributes: NodeAttributes = match entry.size {
                Some(size) => NodeAttributes::file(size, entry.last_modified),
                None => NodeAttributes::DIRECTORY,
            };
            children
                .entry(name.to_string())
                .and_modify(|existing| {
                    if attributes.kind == NodeKind::File {
                        *existing = attributes;
                    }
                })
                .or_insert(attributes);
        }

        Ok(children
            .into_iter()
            .map(|(name, attributes)| self.with_attributes(self.key.child(&name), attributes))
            .collect())
    }

    /// Every file below this node, as paths relative to it, sorted.
    ///
    /// Answered from the covering frame inside a scope, otherwise with one
    /// recursive listing.
    pub async fn list_files_recursive(&self) -> Result<Vec<String>, VfsError> {
        if let Some(hit) = self.context.lookup(&self.key) {
            return Ok(hit
                .frame
                .files_under(&hit.rel)
                .into_iter()
                .map(|(path, _)| path)
                .collect());
        }

        let prefix: String = self.key.dir_prefix();
        let objects: Vec<ObjectInfo> = self
            .store
            .list(self.key.container(), &prefix, true)
            .await
            .map_err(|e| self.storage_error(e))?;

        let mut paths: Vec<String> = objects
            .into_iter()
            .filter(|o| !o.is_common_prefix())
            .filter_map(|o| o.key.strip_prefix(prefix.as_str()).map(str::to_string))
            .filter(|rel| !rel.is_empty())
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Relative file paths below this node filtered by glob patterns.
    ///
    /// # Arguments
    /// * `includes` - Patterns to keep (empty = everything)
    /// * `excludes` - Patterns to drop
    ///
    /// # Errors
    /// `InvalidGlobPattern` for a malformed pattern, before any listing.
    pub async fn list_glob<S: AsRef<str>>(
        &self,
        includes: &[S],
        excludes: &[S],
    ) -> Result<Vec<String>, VfsError> {
        let filter: GlobFilter = GlobFilter::new(includes, excludes)?;
        let paths: Vec<String> = self.list_files_recursive().await?;
        Ok(paths.into_iter().filter(|p| filter.matches(p)).collect())
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Open the file for reading.
    ///
    /// # Errors
    /// `IsADirectory` for a directory, `NotFound` for a missing key.
    pub async fn open(&self) -> Result<BlobReader, VfsError> {
        match self.kind().await? {
            NodeKind::File => self
                .store
                .open_read(self.key.container(), self.key.path())
                .await
                .map_err(|e| self.storage_error(e)),
            NodeKind::Directory => Err(VfsError::IsADirectory {
                path: self.key.to_string(),
            }),
            NodeKind::Missing => Err(VfsError::NotFound {
                path: self.key.to_string(),
            }),
        }
    }

    /// Presigned GET URL for the file.
    ///
    /// # Arguments
    /// * `ttl` - How long the URL stays valid
    ///
    /// # Errors
    /// `NotAFile` for a directory or missing node.
    pub async fn external_url(&self, ttl: Duration) -> Result<Url, VfsError> {
        if self.kind().await? != NodeKind::File {
            return Err(VfsError::NotAFile {
                path: self.key.to_string(),
            });
        }
        self.store
            .presign(self.key.container(), self.key.path(), PresignMethod::Get, ttl)
            .await
            .map_err(|e| self.storage_error(e))
    }

    // ========================================================================
    // Scoped traversal
    // ========================================================================

    /// Run `operation` with one recursive listing of this subtree cached.
    ///
    /// Lists every object under this node once, together with a metadata
    /// lookup of the node's own key, and pushes the result onto the node's
    /// listing context. Queries on nodes of the same context that fall
    /// inside the subtree are answered from it without network calls. The
    /// frame is popped when `operation` finishes, fails, or the returned
    /// future is dropped.
    ///
    /// # Arguments
    /// * `operation` - Work to run while the frame is active
    ///
    /// # Returns
    /// Whatever `operation` returns; a listing failure is converted into `E`.
    pub async fn run_scoped<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<VfsError>,
    {
        let container: &str = self.key.container();
        let prefix: String = self.key.dir_prefix();
        let listing = self.store.list(container, &prefix, true);

        let (metadata, objects): (
            Result<Option<ObjectMetadata>, StorageError>,
            Result<Vec<ObjectInfo>, StorageError>,
        ) = if self.key.is_root() {
            (Ok(None), listing.await)
        } else {
            tokio::join!(self.store.get_metadata(container, self.key.path()), listing)
        };

        let objects: Vec<ObjectInfo> = objects.map_err(|e| E::from(self.storage_error(e)))?;
        let root_entry: Option<CachedEntry> = metadata
            .map_err(|e| E::from(self.storage_error(e)))?
            .map(|m| CachedEntry {
                size: m.size,
                last_modified: m.last_modified,
            });

        let frame: CacheFrame = CacheFrame::from_listing(&self.key, root_entry, objects);
        let _guard = self.context.push(frame);
        operation().await
    }

    fn storage_error(&self, err: StorageError) -> VfsError {
        VfsError::from_storage(self.key.to_string(), err)
    }
}

fn resolve_in_frame(hit: &FrameHit) -> NodeAttributes {
    if let Some(entry) = hit.frame.entry(&hit.rel) {
        NodeAttributes::file(entry.size, entry.last_modified)
    } else if hit.frame.has_descendants(&hit.rel) {
        NodeAttributes::DIRECTORY
    } else {
        NodeAttributes::MISSING
    }
}

impl fmt::Debug for VirtualNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualNode")
            .field("provider", &self.store.provider_id())
            .field("key", &self.key)
            .field("kind", &self.attributes.get().map(|a| a.kind))
            .finish()
    }
}
