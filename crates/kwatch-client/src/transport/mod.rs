//! Transport layer for watch requests
//!
//! A transport executes one GET request and hands back the status line and
//! the body as a stream of byte chunks. Two reqwest-backed implementations
//! are provided:
//! - [`StreamingTransport`] reads the body incrementally as it arrives
//! - [`BufferedTransport`] reads the whole body once and yields it as one chunk
//!
//! Both satisfy the same contract, so the frame decoder never branches on
//! which one is in use. Callers can plug in their own [`Transport`].
//!
//! # Example
//!
//! ```ignore
//! use kwatch_client::transport::create_transport;
//! use kwatch_client::ClientConfig;
//!
//! let config = ClientConfig::builder("https://10.0.0.1:6443").build();
//! let transport = create_transport(&config)?;
//! ```

mod http;
pub mod mock;

pub use http::{BufferedTransport, StreamingTransport};
pub use mock::MockTransport;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use reqwest::header::HeaderMap;
use url::Url;

use crate::config::{ClientConfig, TransportMode};
use crate::error::Result;
use crate::request::CancelSignal;

/// Response body as a sequence of byte chunks
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Outbound watch request, decorated by the authentication step
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Fully addressed URL including the watch query
    pub url: Url,
    /// Request headers
    pub headers: HeaderMap,
}

impl HttpRequest {
    /// Create a GET request for `url` with no headers
    pub fn get(url: Url) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
        }
    }
}

/// Response status line plus an unread body
pub struct HttpResponse {
    /// Numeric status code
    pub status: u16,
    /// Human-readable status description
    pub reason: String,
    /// Response headers
    pub headers: HeaderMap,
    /// Body chunks, not yet read
    pub body: BodyStream,
    /// The body is known to be complete once the stream ends, so a final
    /// unterminated line is still worth decoding
    pub complete: bool,
}

impl HttpResponse {
    /// Build a response whose body is already fully in memory
    pub fn whole(status: u16, reason: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        let chunks: Vec<Result<Bytes>> = if body.is_empty() { vec![] } else { vec![Ok(body)] };
        Self {
            status,
            reason: reason.into(),
            headers,
            body: Box::pin(stream::iter(chunks)),
            complete: true,
        }
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

/// Pluggable request executor
///
/// Implementations must race the in-flight call against `signal` and drop
/// the underlying connection when the signal fires first.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return once the status line is known
    async fn send(&self, request: HttpRequest, signal: &CancelSignal) -> Result<HttpResponse>;
}

/// Create a transport based on configuration
pub fn create_transport(config: &ClientConfig) -> Result<Arc<dyn Transport>> {
    match config.transport {
        TransportMode::Streaming => Ok(Arc::new(StreamingTransport::from_config(config)?)),
        TransportMode::Buffered => Ok(Arc::new(BufferedTransport::from_config(config)?)),
    }
}

/// Status description for a numeric code
pub(crate) fn reason_phrase(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
