//! Reliable network transfers for CI artifact storage.
//!
//! The central piece is [`RobustOperationExecutor`], which runs one logical
//! network operation as a sequence of attempts:
//!
//! - **Classification** - every failure carries a [`FailureKind`]: cancelled,
//!   client error (4xx, never retried) or transient (5xx, no status, timeout)
//! - **Backoff** - transient failures sleep `min(2^attempt * base, ceiling)`
//!   before the next attempt, as configured by [`RetryPolicy`]
//! - **Isolation** - attempts run on a bounded [`WorkerPool`] that enforces the
//!   per-attempt timeout
//! - **Cancellation** - a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   ends the loop during an attempt or a backoff sleep
//!
//! [`PresignedTransfer`] builds HTTP PUT uploads and GET downloads against
//! presigned URLs on top of the executor.

mod error;
pub mod executor;
pub mod policy;
pub mod pool;
pub mod presigned;
pub mod response;
pub mod sink;

pub use error::{FailureKind, TransferError};
pub use executor::RobustOperationExecutor;
pub use policy::RetryPolicy;
pub use pool::{PoolConfig, PoolError, WorkerPool};
pub use presigned::{PresignedTransfer, ReqwestResponse};
pub use response::{CannedResponse, HttpResponse, DIAGNOSTIC_BODY_LIMIT};
pub use sink::{LogSink, MemorySink, TracingSink, WriterSink};
