//! Error types for the virtual file tree.

use rusty_artifacts_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during tree operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No object and no descendant objects under the path.
    #[error("No such file or directory: {path}")]
    NotFound { path: String },

    /// The backing store refused the listing or read.
    #[error("Access denied to {path}: {message}")]
    AccessDenied { path: String, message: String },

    /// A byte stream was requested from a directory.
    #[error("Is a directory: {path}")]
    IsADirectory { path: String },

    /// A file-only operation was requested on a directory or missing node.
    #[error("Not a file: {path}")]
    NotAFile { path: String },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },

    /// Any other backend failure.
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: StorageError,
    },
}

impl VfsError {
    /// Map a backend failure on `path` into the tree taxonomy.
    ///
    /// Authorization failures and missing containers or objects become
    /// [`VfsError::AccessDenied`] and [`VfsError::NotFound`]; everything else
    /// is wrapped as [`VfsError::Storage`].
    ///
    /// # Arguments
    /// * `path` - Display path of the node being resolved
    /// * `err` - The backend error
    pub fn from_storage(path: impl Into<String>, err: StorageError) -> Self {
        let path: String = path.into();
        if err.is_access_denied() {
            VfsError::AccessDenied {
                path,
                message: err.to_string(),
            }
        } else if err.is_not_found() {
            VfsError::NotFound { path }
        } else {
            VfsError::Storage { path, source: err }
        }
    }

    /// Whether this is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound { .. })
    }
}
