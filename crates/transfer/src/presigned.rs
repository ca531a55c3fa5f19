//! HTTP transfers against presigned URLs.
//!
//! Uploads PUT a local file, downloads GET a blob into a local file. Every
//! transfer goes through [`RobustOperationExecutor`], so each attempt reopens
//! the local file and streams from the start.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use tokio::io::AsyncWriteExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::TransferError;
use crate::executor::RobustOperationExecutor;
use crate::policy::RetryPolicy;
use crate::response::{truncate_body, HttpResponse};
use crate::sink::LogSink;

/// [`HttpResponse`] over a `reqwest` response.
#[derive(Debug)]
pub struct ReqwestResponse {
    inner: reqwest::Response,
}

impl ReqwestResponse {
    pub fn new(inner: reqwest::Response) -> Self {
        Self { inner }
    }

    /// The wrapped response.
    pub fn into_inner(self) -> reqwest::Response {
        self.inner
    }
}

#[async_trait]
impl HttpResponse for ReqwestResponse {
    fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    fn reason(&self) -> String {
        self.inner
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string()
    }

    async fn diagnostic_body(self, limit: usize) -> String {
        let mut response: reqwest::Response = self.inner;
        let mut collected: Vec<u8> = Vec::new();
        while collected.len() <= limit {
            match response.chunk().await {
                Ok(Some(chunk)) => collected.extend_from_slice(&chunk),
                Ok(None) | Err(_) => break,
            }
        }
        truncate_body(&collected, limit)
    }
}

/// Moves files to and from presigned URLs with retries.
#[derive(Debug, Clone)]
pub struct PresignedTransfer {
    client: reqwest::Client,
    executor: RobustOperationExecutor,
    policy: RetryPolicy,
}

impl PresignedTransfer {
    /// Create a transfer helper.
    ///
    /// # Arguments
    /// * `executor` - Executor running every attempt
    /// * `policy` - Retry policy applied to each transfer
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be initialized.
    pub fn new(executor: RobustOperationExecutor, policy: RetryPolicy) -> Result<Self, TransferError> {
        let client: reqwest::Client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransferError::connection("initialize HTTP client", e))?;
        Ok(Self::with_client(client, executor, policy))
    }

    /// Create a transfer helper on an existing HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        executor: RobustOperationExecutor,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            executor,
            policy,
        }
    }

    /// Retry policy applied to each transfer.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload a local file with HTTP PUT.
    ///
    /// # Arguments
    /// * `url` - Presigned PUT URL
    /// * `path` - Local file to send
    /// * `sink` - Receives retry notices
    /// * `cancel` - Interrupts the upload
    ///
    /// # Returns
    /// Number of bytes sent.
    pub async fn upload_file(
        &self,
        url: &Url,
        path: &Path,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let description: String = format!("upload {} to {}", path.display(), redact(url));
        let client: reqwest::Client = self.client.clone();
        let target: Url = url.clone();
        let source: PathBuf = path.to_path_buf();
        let operation: String = description.clone();

        self.executor
            .execute(
                &description,
                move || put_file(client.clone(), target.clone(), source.clone(), operation.clone()),
                sent_length,
                &self.policy,
                sink,
                cancel,
            )
            .await
    }

    /// Download a blob with HTTP GET into a local file.
    ///
    /// The destination is truncated at the start of every attempt.
    ///
    /// # Arguments
    /// * `url` - Presigned GET URL
    /// * `path` - Destination file
    /// * `sink` - Receives retry notices
    /// * `cancel` - Interrupts the download
    ///
    /// # Returns
    /// Number of bytes written.
    pub async fn download_file(
        &self,
        url: &Url,
        path: &Path,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let description: String = format!("download {} to {}", redact(url), path.display());
        let client: reqwest::Client = self.client.clone();
        let source: Url = url.clone();
        let operation: String = description.clone();
        let write_operation: String = description.clone();
        let destination: PathBuf = path.to_path_buf();

        self.executor
            .execute(
                &description,
                move || get_url(client.clone(), source.clone(), operation.clone()),
                move |response: ReqwestResponse| {
                    write_body(response, destination.clone(), write_operation.clone())
                },
                &self.policy,
                sink,
                cancel,
            )
            .await
    }
}

/// PUT a local file, reopening it from the start.
async fn put_file(
    client: reqwest::Client,
    target: Url,
    source: PathBuf,
    operation: String,
) -> Result<SizedResponse, TransferError> {
    let file: tokio::fs::File = tokio::fs::File::open(&source)
        .await
        .map_err(|e| TransferError::io(&operation, &source, e))?;
    let length: u64 = file
        .metadata()
        .await
        .map_err(|e| TransferError::io(&operation, &source, e))?
        .len();
    let body: reqwest::Body = reqwest::Body::wrap_stream(ReaderStream::new(file));

    let response: reqwest::Response = client
        .put(target)
        .header(CONTENT_LENGTH, length)
        .body(body)
        .send()
        .await
        .map_err(|e| TransferError::connection(&operation, e))?;
    Ok(SizedResponse {
        response: ReqwestResponse::new(response),
        length,
    })
}

async fn sent_length(sized: SizedResponse) -> Result<u64, TransferError> {
    Ok(sized.length)
}

async fn get_url(
    client: reqwest::Client,
    source: Url,
    operation: String,
) -> Result<ReqwestResponse, TransferError> {
    client
        .get(source)
        .send()
        .await
        .map(ReqwestResponse::new)
        .map_err(|e| TransferError::connection(&operation, e))
}

/// Upload response paired with the number of bytes sent.
struct SizedResponse {
    response: ReqwestResponse,
    length: u64,
}

#[async_trait]
impl HttpResponse for SizedResponse {
    fn status(&self) -> u16 {
        self.response.status()
    }

    fn reason(&self) -> String {
        self.response.reason()
    }

    async fn diagnostic_body(self, limit: usize) -> String {
        self.response.diagnostic_body(limit).await
    }
}

/// Stream a response body into `destination`.
async fn write_body(
    response: ReqwestResponse,
    destination: PathBuf,
    operation: String,
) -> Result<u64, TransferError> {
    let stream = response
        .into_inner()
        .bytes_stream()
        .map(|r| r.map_err(std::io::Error::other));
    let mut reader = StreamReader::new(stream);

    let mut file: tokio::fs::File = tokio::fs::File::create(&destination)
        .await
        .map_err(|e| TransferError::io(&operation, &destination, e))?;
    let written: u64 = tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(|e| TransferError::io(&operation, &destination, e))?;
    file.flush()
        .await
        .map_err(|e| TransferError::io(&operation, &destination, e))?;

    tracing::debug!(path = %destination.display(), bytes = written, "Download complete");
    Ok(written)
}

/// URL without its query string; presigned signatures stay out of logs.
fn redact(url: &Url) -> String {
    let mut shown: Url = url.clone();
    shown.set_query(None);
    shown.to_string()
}
