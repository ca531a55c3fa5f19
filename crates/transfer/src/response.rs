//! Transport-agnostic response handle consumed by the executor.

use async_trait::async_trait;

/// Maximum number of bytes of a failed response body kept for diagnostics.
pub const DIAGNOSTIC_BODY_LIMIT: usize = 1024;

/// A response returned by one connection attempt.
///
/// The executor only needs the status line and, for failures, a bounded
/// prefix of the body to quote in the error.
#[async_trait]
pub trait HttpResponse: Send + 'static {
    /// HTTP status code.
    fn status(&self) -> u16;

    /// Reason phrase for the status (may be empty).
    fn reason(&self) -> String;

    /// Consume the response and return at most `limit` bytes of its body.
    ///
    /// # Arguments
    /// * `limit` - Maximum number of bytes to keep
    ///
    /// # Returns
    /// The body decoded lossily as UTF-8. Read failures produce an empty string.
    async fn diagnostic_body(self, limit: usize) -> String
    where
        Self: Sized;
}

/// Whether a status code is a success.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Cut a body down to `limit` bytes and decode it for display.
///
/// # Arguments
/// * `body` - Raw body bytes
/// * `limit` - Maximum number of bytes to keep
pub fn truncate_body(body: &[u8], limit: usize) -> String {
    let kept: &[u8] = &body[..body.len().min(limit)];
    let mut text: String = String::from_utf8_lossy(kept).into_owned();
    if body.len() > limit {
        text.push_str("...");
    }
    text
}

/// A fully buffered response.
///
/// Useful for adapters that already hold the whole reply and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    pub status: u16,
    pub reason: String,
    pub body: Vec<u8>,
}

impl CannedResponse {
    /// Create a canned response.
    ///
    /// # Arguments
    /// * `status` - HTTP status code
    /// * `reason` - Reason phrase
    /// * `body` - Response body
    pub fn new(status: u16, reason: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason: reason.into(),
            body: body.into(),
        }
    }

    /// A `200 OK` response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, "OK", body)
    }
}

#[async_trait]
impl HttpResponse for CannedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn reason(&self) -> String {
        self.reason.clone()
    }

    async fn diagnostic_body(self, limit: usize) -> String {
        truncate_body(&self.body, limit)
    }
}
