//! Retrying executor for network operations.
//!
//! One logical operation (an upload to a presigned URL, a blob download) is
//! run as a sequence of attempts. Each attempt executes on the shared
//! [`WorkerPool`] under the policy's per-attempt timeout; its outcome is
//! classified once into a [`FailureKind`] and the retry decision only looks
//! at that kind.
//!
//! # Cancellation
//!
//! The caller's [`CancellationToken`] is observed while an attempt is in
//! flight and while sleeping between attempts. Either wait ends immediately
//! when the token fires, and the in-flight attempt is abandoned on the pool.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{FailureKind, TransferError};
use crate::policy::{duration_ms, RetryPolicy};
use crate::pool::{PoolError, WorkerPool};
use crate::response::{is_success, HttpResponse, DIAGNOSTIC_BODY_LIMIT};
use crate::sink::LogSink;

/// Runs network operations with classified retries and exponential backoff.
///
/// Cheap to clone; clones share the same worker pool.
#[derive(Debug, Clone)]
pub struct RobustOperationExecutor {
    pool: Arc<WorkerPool>,
}

impl RobustOperationExecutor {
    /// Create an executor on an existing pool.
    ///
    /// # Arguments
    /// * `pool` - Worker pool shared by all attempts
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// Create an executor with its own default-sized pool.
    pub fn with_defaults() -> Result<Self, PoolError> {
        Ok(Self::new(Arc::new(WorkerPool::with_defaults()?)))
    }

    /// The pool attempts run on.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Execute one logical operation under `policy`.
    ///
    /// `connect` is called once per attempt and yields a future that opens the
    /// connection. A 2xx response is handed to `on_success`, whose result is
    /// returned. Any other status is turned into a failure carrying the status,
    /// reason and a truncated body. Client errors (4xx) fail at once; transient
    /// failures (5xx, no status, timeout) are retried until the attempt budget
    /// runs out.
    ///
    /// # Arguments
    /// * `description` - Operation and target, quoted in logs and errors
    /// * `connect` - Opens a connection and returns the response handle
    /// * `on_success` - Consumes a successful response
    /// * `policy` - Attempt budget, backoff and timeouts
    /// * `sink` - Receives retry notices; flushed after a successful attempt
    /// * `cancel` - Interrupts the operation
    ///
    /// # Returns
    /// The value produced by `on_success`, or the failure that ended the loop.
    pub async fn execute<C, CF, R, S, SF, T>(
        &self,
        description: &str,
        connect: C,
        on_success: S,
        policy: &RetryPolicy,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<T, TransferError>
    where
        C: Fn() -> CF + Send + Sync,
        CF: Future<Output = Result<R, TransferError>> + Send + 'static,
        R: HttpResponse,
        S: Fn(R) -> SF + Send + Sync + 'static,
        SF: Future<Output = Result<T, TransferError>> + Send + 'static,
        T: Send + 'static,
    {
        let on_success: Arc<S> = Arc::new(on_success);
        let started: Instant = Instant::now();
        let max_attempts: u32 = policy.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(TransferError::cancelled(description));
            }

            let timeout: Duration = attempt_timeout(policy, started);
            tracing::debug!(
                operation = description,
                attempt,
                max_attempts,
                timeout_ms = duration_ms(timeout),
                "Starting attempt"
            );

            let err: TransferError = match self
                .run_attempt(description, &connect, on_success.clone(), timeout, cancel)
                .await
            {
                Ok(value) => {
                    sink.line(&format!("{} completed after {} attempt(s)", description, attempt));
                    sink.flush();
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.kind() {
                FailureKind::Cancelled | FailureKind::ClientError => {
                    tracing::debug!(operation = description, attempt, error = %err, "Giving up");
                    return Err(err);
                }
                FailureKind::Transient if attempt >= max_attempts => {
                    tracing::debug!(
                        operation = description,
                        attempt,
                        error = %err,
                        "Attempt budget exhausted"
                    );
                    return Err(err);
                }
                FailureKind::Transient => {}
            }

            let backoff: Duration = policy.backoff_for(attempt);
            if let Some(deadline) = policy.overall_deadline() {
                if started.elapsed() + backoff >= deadline {
                    tracing::debug!(
                        operation = description,
                        attempt,
                        error = %err,
                        "Overall deadline reached"
                    );
                    return Err(err);
                }
            }

            sink.line(&format!("Retrying {} after: {}", description, err));
            tracing::warn!(
                operation = description,
                attempt,
                backoff_ms = duration_ms(backoff),
                error = %err,
                "Retrying after transient failure"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TransferError::cancelled(description));
                }
                _ = tokio::time::sleep(backoff) => {}
            }

            attempt += 1;
        }
    }

    /// Run a single attempt on the pool and map pool failures.
    async fn run_attempt<C, CF, R, S, SF, T>(
        &self,
        description: &str,
        connect: &C,
        on_success: Arc<S>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<T, TransferError>
    where
        C: Fn() -> CF + Send + Sync,
        CF: Future<Output = Result<R, TransferError>> + Send + 'static,
        R: HttpResponse,
        S: Fn(R) -> SF + Send + Sync + 'static,
        SF: Future<Output = Result<T, TransferError>> + Send + 'static,
        T: Send + 'static,
    {
        let work = attempt(description.to_string(), connect(), on_success);

        // Abandon the attempt on the pool if this wait ends for any reason.
        let attempt_token: CancellationToken = cancel.child_token();
        let _guard = attempt_token.clone().drop_guard();

        let outcome: Result<Result<T, TransferError>, PoolError> = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TransferError::cancelled(description));
            }
            outcome = self.pool.run(work, timeout, attempt_token) => outcome,
        };

        match outcome {
            Ok(result) => result,
            Err(PoolError::Timeout { duration }) => Err(TransferError::Timeout {
                operation: description.to_string(),
                duration,
            }),
            Err(PoolError::Cancelled) if cancel.is_cancelled() => {
                Err(TransferError::cancelled(description))
            }
            Err(source) => Err(TransferError::Pool {
                operation: description.to_string(),
                source,
            }),
        }
    }
}

/// One attempt: connect, then hand a 2xx to `on_success` or build a status failure.
async fn attempt<CF, R, S, SF, T>(
    operation: String,
    connecting: CF,
    on_success: Arc<S>,
) -> Result<T, TransferError>
where
    CF: Future<Output = Result<R, TransferError>>,
    R: HttpResponse,
    S: Fn(R) -> SF,
    SF: Future<Output = Result<T, TransferError>>,
{
    let response: R = connecting.await?;
    let status: u16 = response.status();
    if is_success(status) {
        return on_success(response).await;
    }
    let reason: String = response.reason();
    let body: String = response.diagnostic_body(DIAGNOSTIC_BODY_LIMIT).await;
    Err(TransferError::Status {
        operation,
        status,
        reason,
        body,
    })
}

/// Per-attempt timeout, shortened to what is left of the overall deadline.
fn attempt_timeout(policy: &RetryPolicy, started: Instant) -> Duration {
    let timeout: Duration = policy.attempt_timeout();
    match policy.overall_deadline() {
        Some(deadline) => timeout.min(deadline.saturating_sub(started.elapsed())),
        None => timeout,
    }
}
