//! Error types for blob-store operations.

use thiserror::Error;

/// Errors that can occur during blob-store operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object not found.
    #[error("Object not found: {container}/{key}")]
    NotFound { container: String, key: String },

    /// The container itself does not exist.
    #[error("Container not found: {container}")]
    ContainerNotFound { container: String },

    /// Access denied.
    #[error("Access denied to {container}/{key}: {message}")]
    AccessDenied {
        container: String,
        key: String,
        message: String,
    },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// No provider registered under the requested identifier.
    #[error("Unknown blob store provider: {id}")]
    UnknownProvider { id: String },

    /// Two providers were registered under the same identifier.
    #[error("Duplicate blob store provider: {id}")]
    DuplicateProvider { id: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::NotFound { .. } => false,
            StorageError::ContainerNotFound { .. } => false,
            StorageError::AccessDenied { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::UnknownProvider { .. } => false,
            StorageError::DuplicateProvider { .. } => false,
            StorageError::InvalidConfig { .. } => false,
            StorageError::Other { .. } => false,
        }
    }

    /// Check if this error means the object or its container is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound { .. } | StorageError::ContainerNotFound { .. }
        )
    }

    /// Check if this error is an authorization failure.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, StorageError::AccessDenied { .. })
    }

    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `source` - The underlying IO error
    pub fn io_error(path: impl Into<String>, source: &std::io::Error) -> Self {
        StorageError::IoError {
            path: path.into(),
            message: source.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let missing = StorageError::ContainerNotFound {
            container: "artifacts".into(),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_access_denied());
        assert!(!missing.is_retryable());

        let denied = StorageError::AccessDenied {
            container: "artifacts".into(),
            key: "job/1".into(),
            message: "forbidden".into(),
        };
        assert!(denied.is_access_denied());
        assert!(!denied.is_not_found());

        let flaky = StorageError::NetworkError {
            message: "connection reset".into(),
            retryable: true,
        };
        assert!(flaky.is_retryable());
    }

    #[test]
    fn test_display_names_target() {
        let err = StorageError::NotFound {
            container: "artifacts".into(),
            key: "job/1/log.txt".into(),
        };
        assert_eq!(err.to_string(), "Object not found: artifacts/job/1/log.txt");
    }
}
