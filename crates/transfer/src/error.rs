//! Error types for transfer operations.

use std::time::Duration;

use thiserror::Error;

use crate::pool::PoolError;

/// How the retry loop must react to a failure.
///
/// Assigned once, where the failure is produced, and consumed uniformly by the
/// retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The caller was interrupted. Never retried.
    Cancelled,
    /// Permanent failure (4xx and similar). Never retried.
    ClientError,
    /// 5xx, connection-level failure or per-attempt timeout. Retried.
    Transient,
}

/// Errors that can occur while executing a network operation.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The calling context cancelled the operation.
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// The server answered with a non-2xx status.
    #[error("{operation} failed with HTTP {status} {reason}: {body}")]
    Status {
        operation: String,
        status: u16,
        reason: String,
        body: String,
    },

    /// No response at all (DNS, connect, reset).
    #[error("{operation} failed with no HTTP status: {message}")]
    Connection { operation: String, message: String },

    /// The attempt did not finish within the per-attempt timeout.
    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// Local I/O failed while producing or consuming the payload.
    #[error("{operation} failed on {path}: {source}")]
    Io {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The worker pool could not run the attempt.
    #[error("{operation} could not run: {source}")]
    Pool {
        operation: String,
        #[source]
        source: PoolError,
    },
}

impl TransferError {
    /// Classify this error for the retry decision.
    pub fn kind(&self) -> FailureKind {
        match self {
            TransferError::Cancelled { .. } => FailureKind::Cancelled,
            TransferError::Status { status, .. } if (400..500).contains(status) => {
                FailureKind::ClientError
            }
            TransferError::Status { .. } => FailureKind::Transient,
            TransferError::Connection { .. } => FailureKind::Transient,
            TransferError::Timeout { .. } => FailureKind::Transient,
            TransferError::Io { .. } => FailureKind::Transient,
            TransferError::Pool { source, .. } => match source {
                PoolError::Shutdown | PoolError::Cancelled => FailureKind::Cancelled,
                PoolError::Timeout { .. } => FailureKind::Transient,
                PoolError::TaskPanicked | PoolError::Startup(_) => FailureKind::ClientError,
            },
        }
    }

    /// HTTP status carried by the failure; 0 when there was no response.
    pub fn status(&self) -> u16 {
        match self {
            TransferError::Status { status, .. } => *status,
            _ => 0,
        }
    }

    /// Description of the operation that failed.
    pub fn operation(&self) -> &str {
        match self {
            TransferError::Cancelled { operation }
            | TransferError::Status { operation, .. }
            | TransferError::Connection { operation, .. }
            | TransferError::Timeout { operation, .. }
            | TransferError::Io { operation, .. }
            | TransferError::Pool { operation, .. } => operation,
        }
    }

    /// Whether this is an interruption rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        self.kind() == FailureKind::Cancelled
    }

    /// Create a Cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        TransferError::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a Connection error from any displayable transport failure.
    ///
    /// # Arguments
    /// * `operation` - Description of the operation
    /// * `err` - The transport error
    pub fn connection(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        TransferError::Connection {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Create an Io error.
    ///
    /// # Arguments
    /// * `operation` - Description of the operation
    /// * `path` - Local path involved
    /// * `source` - The underlying IO error
    pub fn io(
        operation: impl Into<String>,
        path: impl AsRef<std::path::Path>,
        source: std::io::Error,
    ) -> Self {
        TransferError::Io {
            operation: operation.into(),
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> TransferError {
        TransferError::Status {
            operation: "upload log.txt".into(),
            status: code,
            reason: "Reason".into(),
            body: "<Error/>".into(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(status(400).kind(), FailureKind::ClientError);
        assert_eq!(status(403).kind(), FailureKind::ClientError);
        assert_eq!(status(499).kind(), FailureKind::ClientError);
        assert_eq!(status(500).kind(), FailureKind::Transient);
        assert_eq!(status(503).kind(), FailureKind::Transient);
    }

    #[test]
    fn test_no_status_is_transient() {
        let err: TransferError = TransferError::connection("download", "connection reset by peer");
        assert_eq!(err.kind(), FailureKind::Transient);
        assert_eq!(err.status(), 0);

        let timeout = TransferError::Timeout {
            operation: "download".into(),
            duration: Duration::from_secs(900),
        };
        assert_eq!(timeout.kind(), FailureKind::Transient);
    }

    #[test]
    fn test_cancellation_is_distinct_from_timeout() {
        let err: TransferError = TransferError::cancelled("download");
        assert!(err.is_cancelled());
        assert_eq!(err.operation(), "download");

        let shutdown = TransferError::Pool {
            operation: "download".into(),
            source: PoolError::Shutdown,
        };
        assert!(shutdown.is_cancelled());
    }

    #[test]
    fn test_message_keeps_diagnostics() {
        let message: String = status(403).to_string();
        assert!(message.contains("upload log.txt"));
        assert!(message.contains("403"));
        assert!(message.contains("Reason"));
        assert!(message.contains("<Error/>"));
    }
}
