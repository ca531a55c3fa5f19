//! Shared data structures for blob-store operations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::ObjectInfo;

/// Address of a blob: a container plus a slash-delimited path.
///
/// The path never carries a leading slash and, except for the container
/// root (empty path), never a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobKey {
    container: String,
    path: String,
}

impl BlobKey {
    /// Create a key, stripping leading and trailing slashes from `path`.
    ///
    /// # Arguments
    /// * `container` - Container name (bucket)
    /// * `path` - Slash-delimited object path
    pub fn new(container: impl Into<String>, path: impl AsRef<str>) -> Self {
        Self {
            container: container.into(),
            path: path.as_ref().trim_matches('/').to_string(),
        }
    }

    /// Key for the root of a container.
    pub fn root(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            path: String::new(),
        }
    }

    /// Container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Object path within the container.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this key is the container root.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Final path segment ("" for the container root).
    pub fn name(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Key with the last segment stripped. The root is its own parent.
    pub fn parent(&self) -> BlobKey {
        let path: &str = match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        };
        Self {
            container: self.container.clone(),
            path: path.to_string(),
        }
    }

    /// Key for a direct child. Performs no normalization of `name`.
    ///
    /// # Arguments
    /// * `name` - Child segment name
    pub fn child(&self, name: &str) -> BlobKey {
        let path: String = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        };
        Self {
            container: self.container.clone(),
            path,
        }
    }

    /// Listing prefix for everything beneath this key: `path + "/"`, or ""
    /// for the container root.
    pub fn dir_prefix(&self) -> String {
        dir_prefix(&self.path)
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.path)
    }
}

/// Listing prefix for a node path: `path + "/"`, or "" for the root.
pub fn dir_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}/", path)
    }
}

/// Collapse a flat, prefix-filtered object listing into a delimited listing.
///
/// Objects directly beneath `prefix` are returned as-is; deeper objects are
/// folded into one common-prefix entry per first segment (key ending in `/`,
/// no size). Backends that can only list recursively use this to answer
/// non-recursive list calls.
///
/// # Arguments
/// * `prefix` - Listing prefix (empty or ending in `/`)
/// * `objects` - Objects whose keys start with `prefix`
///
/// # Returns
/// Entries sorted by key.
pub fn apply_delimiter(prefix: &str, objects: impl IntoIterator<Item = ObjectInfo>) -> Vec<ObjectInfo> {
    let mut entries: BTreeMap<String, ObjectInfo> = BTreeMap::new();

    for object in objects {
        let remainder: &str = match object.key.strip_prefix(prefix) {
            Some(rest) if !rest.is_empty() => rest,
            _ => continue,
        };

        match remainder.find('/') {
            Some(idx) => {
                let common: String = format!("{}{}", prefix, &remainder[..=idx]);
                entries
                    .entry(common.clone())
                    .or_insert_with(|| ObjectInfo::common_prefix(common));
            }
            None => {
                entries.insert(object.key.clone(), object);
            }
        }
    }

    entries.into_values().collect()
}
