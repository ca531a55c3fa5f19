//! Entry point for browsing one artifact or stash root.

use std::fmt;
use std::sync::Arc;

use rusty_artifacts_storage::{BlobKey, BlobStore, BlobStoreRegistry};

use crate::cache::ListingContext;
use crate::error::VfsError;
use crate::node::VirtualNode;

/// A read-only tree rooted at one key of one blob store.
#[derive(Clone)]
pub struct VirtualFileTree {
    store: Arc<dyn BlobStore>,
    root: BlobKey,
}

impl VirtualFileTree {
    /// Create a tree.
    ///
    /// # Arguments
    /// * `store` - Backend holding the blobs
    /// * `container` - Container (bucket) name
    /// * `root_path` - Root within the container; leading and trailing slashes are stripped
    pub fn new(store: Arc<dyn BlobStore>, container: &str, root_path: &str) -> Self {
        Self {
            store,
            root: BlobKey::new(container, root_path),
        }
    }

    /// Create a tree on a registered provider.
    ///
    /// # Arguments
    /// * `registry` - Providers registered at startup
    /// * `provider_id` - Identifier of the provider to use
    /// * `container` - Container (bucket) name
    /// * `root_path` - Root within the container
    ///
    /// # Errors
    /// Returns error if no provider is registered under `provider_id`.
    pub fn from_registry(
        registry: &BlobStoreRegistry,
        provider_id: &str,
        container: &str,
        root_path: &str,
    ) -> Result<Self, VfsError> {
        let store: Arc<dyn BlobStore> = registry
            .get(provider_id)
            .map_err(|e| VfsError::from_storage(provider_id, e))?;
        Ok(Self::new(store, container, root_path))
    }

    /// Key of the tree root.
    pub fn root_key(&self) -> &BlobKey {
        &self.root
    }

    /// Backend the tree reads from.
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Root node in a fresh listing context.
    ///
    /// Use one root per traversal; nodes memoize what they resolve.
    pub fn root(&self) -> VirtualNode {
        self.root_in(&ListingContext::new())
    }

    /// Root node joined to an existing listing context.
    ///
    /// # Arguments
    /// * `context` - Context whose frames the node should see
    pub fn root_in(&self, context: &ListingContext) -> VirtualNode {
        VirtualNode::new(self.store.clone(), self.root.clone(), context.clone())
    }
}

impl fmt::Debug for VirtualFileTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFileTree")
            .field("provider", &self.store.provider_id())
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_artifacts_storage::MemoryBlobStore;

    #[test]
    fn test_root_is_normalized() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let tree: VirtualFileTree = VirtualFileTree::new(store, "artifacts", "/job/1/");
        assert_eq!(tree.root_key().path(), "job/1");
        assert_eq!(tree.root().name(), "1");
    }

    #[test]
    fn test_roots_get_separate_contexts() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let tree: VirtualFileTree = VirtualFileTree::new(store, "artifacts", "job/1");

        assert!(!tree.root().context().same_as(tree.root().context()));

        let shared: ListingContext = ListingContext::new();
        assert!(tree.root_in(&shared).context().same_as(&shared));
    }

    #[test]
    fn test_unknown_provider() {
        let registry: BlobStoreRegistry = BlobStoreRegistry::builder().build().unwrap();
        let result = VirtualFileTree::from_registry(&registry, "s3", "artifacts", "job/1");
        assert!(matches!(result, Err(VfsError::Storage { .. })));
    }
}
