//! Watch invocation and the event stream it produces

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_stream::try_stream;
use bytes::Bytes;
use futures::stream::{FusedStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::connection::{ConnectionResolver, StaticResolver};
use crate::decoder::FrameDecoder;
use crate::error::{Result, WatchError};
use crate::event::WatchEvent;
use crate::request::{
    watch_token, CancelReason, CancelSignal, WatchOptions, WatchRequest, DEFAULT_WATCH_TIMEOUT,
};
use crate::transport::{create_transport, BodyStream, HttpRequest, Transport};

/// Cap on how much of a non-200 body is kept for diagnostics
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Issues watch requests over a pluggable transport
///
/// # Example
///
/// ```ignore
/// use kwatch_client::{ClientConfig, Watcher, WatchOptions};
///
/// let config = ClientConfig::builder("http://localhost:8001").build();
/// let watcher = Watcher::from_config(&config)?;
/// let mut events = watcher.watch::<serde_json::Value>("/api/v1/pods", &WatchOptions::new())?;
///
/// while let Some(event) = events.next().await {
///     let event = event?;
///     if let Some(object) = event.object() {
///         println!("{} {}", event.kind(), object["metadata"]["name"]);
///     }
/// }
/// ```
#[derive(Clone)]
pub struct Watcher {
    resolver: Arc<dyn ConnectionResolver>,
    transport: Arc<dyn Transport>,
    default_timeout: Duration,
}

impl Watcher {
    /// Create a watcher from a resolver and a transport
    pub fn new(resolver: Arc<dyn ConnectionResolver>, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            transport,
            default_timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }

    /// Create a watcher with the static resolver and the configured transport
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let resolver = Arc::new(StaticResolver::from_config(config)?);
        let transport = create_transport(config)?;
        Ok(Self::new(resolver, transport).with_default_timeout(config.timeouts.watch()))
    }

    /// Timeout used when a watch does not set one
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Start a watch on `path`
    ///
    /// Fails right away when no connection is configured or the request
    /// cannot be addressed. Otherwise returns a lazy stream: nothing is sent
    /// until the first poll. Each call opens its own connection.
    #[instrument(skip(self, options))]
    pub fn watch<T>(&self, path: &str, options: &WatchOptions) -> Result<WatchStream<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let connection = self
            .resolver
            .current_connection()
            .ok_or(WatchError::NoConnection)?;
        let request =
            WatchRequest::build(&connection.base_url, path, options, self.default_timeout)?;
        let token = watch_token(options.cancel.as_ref());

        debug!("Prepared watch on {}", request.url());

        Ok(WatchStream::new(
            request.url().clone(),
            token.clone(),
            session(self.resolver.clone(), self.transport.clone(), request, token),
        ))
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

/// Outcome of waiting on the body or the cancel signal
enum Pull {
    Chunk(Option<Result<Bytes>>),
    Fired(CancelReason),
}

/// One watch session: authenticate, send, then decode the body
fn session<T>(
    resolver: Arc<dyn ConnectionResolver>,
    transport: Arc<dyn Transport>,
    request: WatchRequest,
    token: CancellationToken,
) -> impl Stream<Item = Result<WatchEvent<T>>> + Send + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    try_stream! {
        let signal = CancelSignal::new(token, request.timeout());

        let mut http = HttpRequest::get(request.url().clone());
        let authenticated = tokio::select! {
            biased;
            reason = signal.fired() => Err(WatchError::from(reason)),
            result = resolver.apply_authentication(&mut http) => result,
        };
        authenticated?;

        debug!("Dispatching watch request to {}", http.url);
        let response = transport.send(http, &signal).await?;

        if response.status != 200 {
            warn!("Watch request rejected: {} {}", response.status, response.reason);
            let body = read_error_body(response.body, &signal).await;
            Err::<(), _>(WatchError::server(response.status, response.reason, body))?;
            return;
        }

        let complete = response.complete;
        let mut body = response.body;
        let mut decoder = FrameDecoder::<T>::new();
        let mut produced = false;

        loop {
            let pull = tokio::select! {
                biased;
                reason = signal.fired() => Pull::Fired(reason),
                chunk = body.next() => Pull::Chunk(chunk),
            };

            match pull {
                Pull::Fired(reason) if produced => {
                    debug!("Watch ended by {:?} after events, closing connection", reason);
                    break;
                }
                Pull::Fired(reason) => {
                    debug!("Watch ended by {:?} before any event", reason);
                    Err::<(), _>(WatchError::from(reason))?;
                }
                Pull::Chunk(Some(Ok(chunk))) => {
                    for event in decoder.feed(&chunk) {
                        produced = true;
                        yield event;
                    }
                }
                Pull::Chunk(Some(Err(e))) => {
                    Err::<(), _>(e)?;
                }
                Pull::Chunk(None) => {
                    if let Some(event) = decoder.finish(complete) {
                        yield event;
                    }
                    debug!("Watch stream closed by server");
                    break;
                }
            }
        }

        if decoder.dropped() > 0 {
            debug!("Dropped {} malformed watch frames", decoder.dropped());
        }
    }
}

/// Read a non-200 body as diagnostic text, bounded by the cancel signal
async fn read_error_body(mut body: BodyStream, signal: &CancelSignal) -> String {
    let mut buf = Vec::new();
    loop {
        let pull = tokio::select! {
            biased;
            reason = signal.fired() => Pull::Fired(reason),
            chunk = body.next() => Pull::Chunk(chunk),
        };
        match pull {
            Pull::Chunk(Some(Ok(chunk))) => {
                buf.extend_from_slice(&chunk);
                if buf.len() >= MAX_ERROR_BODY {
                    buf.truncate(MAX_ERROR_BODY);
                    break;
                }
            }
            Pull::Chunk(Some(Err(e))) => {
                debug!("Failed to read error body: {}", e);
                break;
            }
            Pull::Chunk(None) | Pull::Fired(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Lazy, single-pass stream of watch events
///
/// Yields events in wire order. Ends when the server closes the response,
/// and after at most one terminal error. Dropping the stream, or calling
/// [`WatchStream::cancel`], closes the underlying connection.
pub struct WatchStream<T> {
    /// Session state; `None` once finished or cancelled
    inner: Option<Pin<Box<dyn Stream<Item = Result<WatchEvent<T>>> + Send>>>,
    /// Token owned by this watch
    token: CancellationToken,
    /// Request URL including the watch query
    url: Url,
}

impl<T> WatchStream<T> {
    fn new(
        url: Url,
        token: CancellationToken,
        inner: impl Stream<Item = Result<WatchEvent<T>>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Some(Box::pin(inner)),
            token,
            url,
        }
    }

    /// Request URL, including the watch query
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Handle that cancels this watch from elsewhere
    pub fn cancel_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop the watch and release the connection now
    pub fn cancel(&mut self) {
        self.token.cancel();
        if self.inner.take().is_some() {
            debug!("Watch on {} cancelled by consumer", self.url);
        }
    }

    /// Get the next event
    ///
    /// Returns `None` when the stream ends or is cancelled.
    pub async fn next(&mut self) -> Option<Result<WatchEvent<T>>> {
        <Self as StreamExt>::next(self).await
    }
}

impl<T> Stream for WatchStream<T> {
    type Item = Result<WatchEvent<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                // Release the transport handle as soon as the session ends
                this.inner = None;
                this.token.cancel();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl<T> FusedStream for WatchStream<T> {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl<T> Drop for WatchStream<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<T> std::fmt::Debug for WatchStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchStream")
            .field("url", &self.url.as_str())
            .field("terminated", &self.inner.is_none())
            .finish()
    }
}
