//! Storage abstraction for CI artifact blobs.
//!
//! This crate defines the blob-store capability the artifact core consumes:
//! prefix listing, metadata lookup, streaming reads and presigned URLs against
//! a container + key namespace. Vendor adapters implement [`BlobStore`] and are
//! registered once at startup in a [`BlobStoreRegistry`].
//!
//! Two reference backends ship with the crate:
//!
//! - **Memory** - [`MemoryBlobStore`], with call counters for verifying round trips
//! - **Local directory** - [`LocalDirBlobStore`], one subdirectory per container

mod error;
pub mod local;
pub mod memory;
mod registry;
mod traits;
mod types;

pub use error::StorageError;
pub use local::{LocalDirBlobStore, LOCAL_PROVIDER_ID};
pub use memory::{CallCounts, MemoryBlobStore, MEMORY_PROVIDER_ID};
pub use registry::{BlobStoreRegistry, BlobStoreRegistryBuilder};
pub use traits::{BlobReader, BlobStore, ObjectInfo, ObjectMetadata, PresignMethod};
pub use types::{apply_delimiter, dir_prefix, BlobKey};
