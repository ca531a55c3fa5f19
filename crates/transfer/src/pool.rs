//! Bounded worker pool for network attempts.
//!
//! Every attempt runs on a dedicated Tokio runtime owned by a background
//! thread, separate from whatever runtime the caller lives on. The pool
//! enforces the per-attempt timeout itself, so a hung connection is abandoned
//! even if the caller is busy, and the caller only waits on a oneshot channel.
//!
//! # Architecture
//!
//! ```text
//! Caller task                    Pool thread
//! ───────────                    ───────────
//!     │                               │
//!     │ run(future) ─────────────────►│
//!     │                               │ spawn task (timeout + cancel)
//!     │ rx.await ◄────────────────────│ send result
//!     │                               │
//! ```
//!
//! Results flow back through a typed oneshot channel created per call; the
//! work item itself only carries a boxed `()` future.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while running work on the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down or its thread died.
    Shutdown,
    /// The work was cancelled through its token.
    Cancelled,
    /// The work did not finish in time.
    Timeout {
        /// The timeout duration that was exceeded.
        duration: Duration,
    },
    /// The task panicked during execution.
    TaskPanicked,
    /// The runtime or its thread could not be started.
    Startup(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Shutdown => write!(f, "Worker pool has been shut down"),
            PoolError::Cancelled => write!(f, "Operation was cancelled"),
            PoolError::Timeout { duration } => {
                write!(f, "Operation timed out after {:?}", duration)
            }
            PoolError::TaskPanicked => write!(f, "Task panicked during execution"),
            PoolError::Startup(msg) => write!(f, "Worker pool failed to start: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

// ============================================================================
// Work Item (Internal)
// ============================================================================

/// Type-erased work item for the pool queue.
struct WorkItem {
    /// The async work to execute. Returns () because result goes through typed channel.
    work: BoxFuture<'static, ()>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of Tokio worker threads.
    pub worker_threads: usize,
    /// Channel buffer size for work submission.
    pub queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            queue_size: 256,
        }
    }
}

impl PoolConfig {
    /// Set the number of worker threads.
    ///
    /// # Arguments
    /// * `worker_threads` - Number of Tokio worker threads (at least 1)
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    /// Set the submission queue size.
    ///
    /// # Arguments
    /// * `queue_size` - Channel buffer size for work submission (at least 1)
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

/// Bounded pool running network attempts on a dedicated runtime thread.
///
/// Shared between all executors of a process; callers never lock anything.
pub struct WorkerPool {
    /// Channel to submit async work.
    tx: mpsc::Sender<WorkItem>,
    /// Cancellation token for shutdown.
    shutdown: CancellationToken,
    /// Handle to the background thread.
    thread: Option<JoinHandle<()>>,
    /// Whether the pool is still running.
    running: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Create a pool with its own runtime thread.
    ///
    /// # Arguments
    /// * `config` - Pool configuration
    ///
    /// # Errors
    /// `PoolError::Startup` if the runtime or the thread cannot be created.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let (tx, rx) = mpsc::channel::<WorkItem>(config.queue_size.max(1));
        let shutdown = CancellationToken::new();
        let token_clone: CancellationToken = shutdown.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone: Arc<AtomicBool> = running.clone();

        // Built here, not on the pool thread, so failures reach the caller.
        let rt: tokio::runtime::Runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("artifact-transfer-worker")
            .enable_all()
            .build()
            .map_err(|e| PoolError::Startup(e.to_string()))?;

        let thread: JoinHandle<()> = std::thread::Builder::new()
            .name("artifact-transfer-pool".to_string())
            .spawn(move || {
                rt.block_on(async move {
                    let mut rx: mpsc::Receiver<WorkItem> = rx;

                    loop {
                        tokio::select! {
                            biased;

                            _ = token_clone.cancelled() => {
                                break;
                            }
                            item = rx.recv() => {
                                match item {
                                    Some(work_item) => {
                                        tokio::spawn(work_item.work);
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                });

                running_clone.store(false, Ordering::Release);
            })
            .map_err(|e| PoolError::Startup(e.to_string()))?;

        tracing::debug!(
            worker_threads = config.worker_threads,
            queue_size = config.queue_size,
            "Started transfer worker pool"
        );

        Ok(Self {
            tx,
            shutdown,
            thread: Some(thread),
            running,
        })
    }

    /// Create a pool with default settings (4 worker threads).
    pub fn with_defaults() -> Result<Self, PoolError> {
        Self::new(PoolConfig::default())
    }

    /// Run a future on the pool and wait for its result.
    ///
    /// The future is abandoned when `timeout` elapses or `token` is
    /// cancelled, whichever comes first. Dropping the returned future does
    /// not stop the work; cancel `token` for that.
    ///
    /// # Arguments
    /// * `future` - The async work to execute
    /// * `timeout` - Maximum time the work may run
    /// * `token` - Cancels the work when triggered
    ///
    /// # Returns
    /// Ok(result) on completion, Err(Timeout / Cancelled / TaskPanicked / Shutdown) otherwise.
    pub async fn run<F, T>(
        &self,
        future: F,
        timeout: Duration,
        token: CancellationToken,
    ) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_running() {
            return Err(PoolError::Shutdown);
        }

        let (result_tx, result_rx) = oneshot::channel::<Result<T, PoolError>>();

        let work: BoxFuture<'static, ()> = async move {
            let result: Result<T, PoolError> = tokio::select! {
                biased;
                _ = token.cancelled() => Err(PoolError::Cancelled),
                outcome = tokio::time::timeout(timeout, AssertUnwindSafe(future).catch_unwind()) => {
                    match outcome {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(_)) => Err(PoolError::TaskPanicked),
                        Err(_) => Err(PoolError::Timeout { duration: timeout }),
                    }
                }
            };
            // Ignore send errors - caller may have dropped
            let _ = result_tx.send(result);
        }
        .boxed();

        if self.tx.send(WorkItem { work }).await.is_err() {
            return Err(PoolError::Shutdown);
        }

        match result_rx.await {
            Ok(result) => result,
            Err(_) => Err(PoolError::Shutdown),
        }
    }

    /// Stop accepting work and abandon everything in flight.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Check if the pool is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
