//! Construction-time registry of blob-store providers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::StorageError;
use crate::traits::BlobStore;

/// Resolved mapping from provider identifier to provider instance.
///
/// Built once at startup through [`BlobStoreRegistryBuilder`] and immutable
/// afterwards, so lookups need no locking.
#[derive(Clone, Default)]
pub struct BlobStoreRegistry {
    providers: HashMap<String, Arc<dyn BlobStore>>,
}

impl BlobStoreRegistry {
    /// Start building a registry.
    pub fn builder() -> BlobStoreRegistryBuilder {
        BlobStoreRegistryBuilder::default()
    }

    /// Look up a provider by identifier.
    ///
    /// # Arguments
    /// * `id` - Provider identifier
    ///
    /// # Errors
    /// `UnknownProvider` if nothing was registered under `id`.
    pub fn get(&self, id: &str) -> Result<Arc<dyn BlobStore>, StorageError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::UnknownProvider { id: id.to_string() })
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for BlobStoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStoreRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

/// Builder for [`BlobStoreRegistry`].
#[derive(Default)]
pub struct BlobStoreRegistryBuilder {
    providers: HashMap<String, Arc<dyn BlobStore>>,
    duplicate: Option<String>,
}

impl BlobStoreRegistryBuilder {
    /// Register a provider under its own `provider_id()`.
    ///
    /// # Arguments
    /// * `store` - Provider instance
    pub fn register(mut self, store: Arc<dyn BlobStore>) -> Self {
        let id: String = store.provider_id().to_string();
        if self.providers.contains_key(&id) {
            self.duplicate.get_or_insert(id);
        } else {
            tracing::debug!(provider = %id, "Registered blob store provider");
            self.providers.insert(id, store);
        }
        self
    }

    /// Finish the registry.
    ///
    /// # Errors
    /// `DuplicateProvider` if two providers shared an identifier.
    pub fn build(self) -> Result<BlobStoreRegistry, StorageError> {
        if let Some(id) = self.duplicate {
            return Err(StorageError::DuplicateProvider { id });
        }
        Ok(BlobStoreRegistry {
            providers: self.providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobStore;

    #[test]
    fn test_lookup_registered_provider() {
        let registry: BlobStoreRegistry = BlobStoreRegistry::builder()
            .register(Arc::new(MemoryBlobStore::with_id("memory")))
            .register(Arc::new(MemoryBlobStore::with_id("staging")))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["memory", "staging"]);
        assert_eq!(registry.get("staging").unwrap().provider_id(), "staging");
    }

    #[test]
    fn test_unknown_provider() {
        let registry: BlobStoreRegistry = BlobStoreRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get("s3"),
            Err(StorageError::UnknownProvider { id }) if id == "s3"
        ));
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let result = BlobStoreRegistry::builder()
            .register(Arc::new(MemoryBlobStore::with_id("memory")))
            .register(Arc::new(MemoryBlobStore::with_id("memory")))
            .build();

        assert!(matches!(
            result,
            Err(StorageError::DuplicateProvider { id }) if id == "memory"
        ));
    }
}
