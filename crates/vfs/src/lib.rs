//! Read-only hierarchical view over flat-keyed artifact storage.
//!
//! Object stores only know containers and keys. This crate presents the
//! slash-delimited keys under an artifact or stash root as a tree of
//! [`VirtualNode`]s with the usual file and directory queries.
//!
//! # Architecture
//!
//! ```text
//! VirtualFileTree::root()
//!        │
//!        ▼
//! VirtualNode ── lookup ──► ListingContext (frame stack, per operation)
//!        │                        │ hit: answered from CacheFrame
//!        │ miss                   ▼
//!        └──────────────► BlobStore (list / get_metadata / open_read)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let tree = VirtualFileTree::new(store, "artifacts", "job/42");
//! let root = tree.root();
//! let sizes = root
//!     .run_scoped(|| async {
//!         let mut sizes = Vec::new();
//!         for child in root.list().await? {
//!             sizes.push((child.name().to_string(), child.length().await?));
//!         }
//!         Ok::<_, VfsError>(sizes)
//!     })
//!     .await?;
//! ```

pub mod cache;
pub mod error;
pub mod glob;
pub mod node;
pub mod tree;

pub use cache::{CacheFrame, CachedEntry, ListingContext};
pub use error::VfsError;
pub use glob::GlobFilter;
pub use node::{NodeKind, VirtualNode};
pub use tree::VirtualFileTree;
