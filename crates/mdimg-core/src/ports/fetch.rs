//! HTTP fetch port.
//!
//! The response head and body are separated so callers can inspect declared
//! `Content-Type`/`Content-Length` and bail out before reading any bytes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::{MigrationError, ValidationFailure};

/// A single GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Header name/value pairs, sent in order.
    pub headers: Vec<(String, String)>,
    /// Whole-request timeout, including reading the body.
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

/// Errors from the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    /// The body grew past the caller's limit and was abandoned.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl From<FetchError> for MigrationError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::BodyTooLarge { limit } => Self::validation(
                ValidationFailure::Oversized,
                format!("body exceeds {limit} bytes"),
            ),
            other => Self::network(other.to_string()),
        }
    }
}

/// A response body that has not been read yet.
#[async_trait]
pub trait ResponseBody: Send {
    /// Read the whole body, failing as soon as more than `limit` bytes arrive.
    async fn read_all(self: Box<Self>, limit: u64) -> Result<Vec<u8>, FetchError>;
}

/// Response head plus unread body.
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// Raw `Set-Cookie` header values.
    pub set_cookies: Vec<String>,
    pub body: Box<dyn ResponseBody>,
}

impl FetchResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("set_cookies", &self.set_cookies.len())
            .finish_non_exhaustive()
    }
}

/// A body that is already in memory.
///
/// Used by fakes and by adapters that buffer small responses.
#[derive(Debug, Clone, Default)]
pub struct BufferedBody(pub Vec<u8>);

#[async_trait]
impl ResponseBody for BufferedBody {
    async fn read_all(self: Box<Self>, limit: u64) -> Result<Vec<u8>, FetchError> {
        if self.0.len() as u64 > limit {
            return Err(FetchError::BodyTooLarge { limit });
        }
        Ok(self.0)
    }
}

/// Port for issuing HTTP GET requests.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Send `request` and return once the response head has arrived.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffered_body_enforces_limit() {
        let body = Box::new(BufferedBody(vec![0; 10]));
        assert_eq!(
            body.read_all(9).await,
            Err(FetchError::BodyTooLarge { limit: 9 })
        );

        let body = Box::new(BufferedBody(vec![1; 10]));
        assert_eq!(body.read_all(10).await.unwrap().len(), 10);
    }

    #[test]
    fn test_oversized_body_is_permanent() {
        let err: MigrationError = FetchError::BodyTooLarge { limit: 5 }.into();
        assert!(!err.is_retryable());

        let err: MigrationError = FetchError::Timeout.into();
        assert!(err.is_retryable());
    }
}
