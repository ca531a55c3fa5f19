//! Listing cache for scoped traversals.
//!
//! A [`CacheFrame`] is the result of one recursive listing under a node: the
//! size and modification time of every file below it, keyed by path relative
//! to the node. Directories are never stored; they are inferred from the
//! paths. Frames live on the LIFO stack of a [`ListingContext`], one context
//! per logical operation.
//!
//! # Lookup
//!
//! ```text
//! key "a/b/g", stack [root "" , root "a"]
//!                               ^^^^^^^^ innermost covering frame wins
//! rel = "b/g"
//!   is file      <- files contains "b/g"
//!   is directory <- some file starts with "b/g/"
//! ```
//!
//! The root itself (`rel = ""`) is answered from the object recorded at the
//! root key when the frame was built.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::Mutex;
use rusty_artifacts_storage::{dir_prefix, BlobKey, ObjectInfo};

/// Cached attributes of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedEntry {
    /// Object size in bytes.
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub last_modified: Option<i64>,
}

/// Snapshot of every file under one root, from a single recursive listing.
#[derive(Debug)]
pub struct CacheFrame {
    container: String,
    /// Root path without trailing slash ("" for the container root).
    root: String,
    /// Relative path -> attributes, files only.
    files: BTreeMap<String, CachedEntry>,
    /// Object stored at the root key itself, if any.
    root_entry: Option<CachedEntry>,
}

impl CacheFrame {
    /// Build a frame from a recursive listing of `dir_prefix(root)`.
    ///
    /// Common-prefix entries and keys outside the root are ignored.
    ///
    /// # Arguments
    /// * `root` - Node the listing was taken under
    /// * `root_entry` - Object stored at `root` itself, if any
    /// * `objects` - Listing result
    pub fn from_listing(
        root: &BlobKey,
        root_entry: Option<CachedEntry>,
        objects: impl IntoIterator<Item = ObjectInfo>,
    ) -> Self {
        let prefix: String = root.dir_prefix();
        let mut files: BTreeMap<String, CachedEntry> = BTreeMap::new();

        for object in objects {
            let size: u64 = match object.size {
                Some(size) => size,
                None => continue,
            };
            let rel: &str = match object.key.strip_prefix(prefix.as_str()) {
                Some(rel) if !rel.is_empty() => rel,
                _ => continue,
            };
            files.insert(
                rel.to_string(),
                CachedEntry {
                    size,
                    last_modified: object.last_modified,
                },
            );
        }

        Self {
            container: root.container().to_string(),
            root: root.path().to_string(),
            files,
            root_entry,
        }
    }

    /// Root path of the frame.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Number of files in the frame.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the listing found no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of `key` relative to this frame's root, if the frame covers it.
    ///
    /// Matching is per segment: root `a` covers `a` and `a/...` but not `ab`.
    pub fn relative_path<'k>(&self, key: &'k BlobKey) -> Option<&'k str> {
        if key.container() != self.container {
            return None;
        }
        let path: &str = key.path();
        if self.root.is_empty() {
            Some(path)
        } else if path == self.root {
            Some("")
        } else {
            path.strip_prefix(self.root.as_str())?.strip_prefix('/')
        }
    }

    /// Attributes of the file at `rel`; `""` is the root key itself.
    pub fn entry(&self, rel: &str) -> Option<CachedEntry> {
        if rel.is_empty() {
            return self.root_entry;
        }
        self.files.get(rel).copied()
    }

    /// Whether any file lies strictly below `rel`.
    pub fn has_descendants(&self, rel: &str) -> bool {
        let prefix: String = dir_prefix(rel);
        self.files
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .next()
            .map_or(false, |(path, _)| path.starts_with(&prefix))
    }

    /// Names of the direct children of `rel`, deduplicated and sorted.
    ///
    /// Each subdirectory is visited once: after the first file under `d/`,
    /// the scan jumps past every other key starting with `d/`.
    pub fn children(&self, rel: &str) -> Vec<String> {
        let prefix: String = dir_prefix(rel);
        let mut names: BTreeSet<String> = BTreeSet::new();
        let mut cursor: Bound<String> = Bound::Included(prefix.clone());

        loop {
            let next: Option<&String> = self
                .files
                .range::<String, _>((cursor.clone(), Bound::Unbounded))
                .map(|(path, _)| path)
                .next();
            let path: &String = match next {
                Some(path) if path.starts_with(&prefix) => path,
                _ => break,
            };

            let rest: &str = &path[prefix.len()..];
            match rest.find('/') {
                Some(slash) => {
                    let name: &str = &rest[..slash];
                    names.insert(name.to_string());
                    // '0' sorts right after '/'
                    cursor = Bound::Included(format!("{}{}0", prefix, name));
                }
                None => {
                    names.insert(rest.to_string());
                    cursor = Bound::Excluded(path.clone());
                }
            }
        }

        names.into_iter().collect()
    }

    /// Every file below `rel`, with paths relative to `rel`.
    pub fn files_under(&self, rel: &str) -> Vec<(String, CachedEntry)> {
        let prefix: String = dir_prefix(rel);
        self.files
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, entry)| (path[prefix.len()..].to_string(), *entry))
            .collect()
    }
}

/// A covering frame found for a key.
#[derive(Debug, Clone)]
pub(crate) struct FrameHit {
    pub frame: Arc<CacheFrame>,
    pub rel: String,
}

/// Per-operation stack of cache frames.
///
/// Clones share the same stack. Create one context per logical operation
/// (a build step, a stash restore); traversals in different contexts never
/// see each other's frames.
#[derive(Debug, Clone, Default)]
pub struct ListingContext {
    frames: Arc<Mutex<Vec<Arc<CacheFrame>>>>,
}

impl ListingContext {
    /// Create a context with an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames currently pushed.
    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Whether two handles refer to the same stack.
    pub fn same_as(&self, other: &ListingContext) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames)
    }

    /// Find the innermost frame covering `key`.
    pub(crate) fn lookup(&self, key: &BlobKey) -> Option<FrameHit> {
        let frames = self.frames.lock();
        frames.iter().rev().find_map(|frame| {
            frame.relative_path(key).map(|rel| FrameHit {
                frame: frame.clone(),
                rel: rel.to_string(),
            })
        })
    }

    /// Push a frame; it is removed when the guard drops.
    pub(crate) fn push(&self, frame: CacheFrame) -> FrameGuard {
        let frame: Arc<CacheFrame> = Arc::new(frame);
        let depth: usize = {
            let mut frames = self.frames.lock();
            frames.push(frame.clone());
            frames.len()
        };
        tracing::debug!(root = %frame.root, files = frame.len(), depth, "Pushed listing frame");
        FrameGuard {
            frames: self.frames.clone(),
            frame,
        }
    }
}

/// Removes its frame from the stack on drop, on every exit path.
pub(crate) struct FrameGuard {
    frames: Arc<Mutex<Vec<Arc<CacheFrame>>>>,
    frame: Arc<CacheFrame>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let mut frames = self.frames.lock();
        if let Some(pos) = frames.iter().rposition(|f| Arc::ptr_eq(f, &self.frame)) {
            frames.remove(pos);
        }
        tracing::debug!(root = %self.frame.root, depth = frames.len(), "Popped listing frame");
    }
}
