//! Mock transport for testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;

use super::{reason_phrase, HttpRequest, HttpResponse, Transport};
use crate::error::{Result, WatchError};
use crate::request::CancelSignal;

/// Scripted reply for one request
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Reply with a status and body chunks
    Reply {
        status: u16,
        chunks: Vec<Bytes>,
        /// Keep the body open after the last chunk
        keep_open: bool,
        /// Mark the body as complete
        complete: bool,
    },
    /// Fail at the connection level
    Fail(String),
    /// Never answer; only the cancel signal ends the call
    Hang,
}

impl MockResponse {
    /// `200 OK` with one newline-terminated line per entry, in one chunk
    pub fn lines(lines: &[&str]) -> Self {
        let body: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        Self::chunks(200, vec![body.into_bytes()])
    }

    /// Reply with explicit chunk boundaries
    pub fn chunks<B: Into<Bytes>>(status: u16, chunks: Vec<B>) -> Self {
        Self::Reply {
            status,
            chunks: chunks.into_iter().map(Into::into).collect(),
            keep_open: false,
            complete: false,
        }
    }

    /// Non-200 reply with a text body
    pub fn status(status: u16, body: &str) -> Self {
        Self::chunks(status, vec![body.to_string()])
    }

    /// Keep the body open after the scripted chunks
    pub fn keep_open(mut self) -> Self {
        if let Self::Reply { keep_open, .. } = &mut self {
            *keep_open = true;
        }
        self
    }

    /// Mark the body as complete (as a buffered transport would)
    pub fn complete(mut self) -> Self {
        if let Self::Reply { complete, .. } = &mut self {
            *complete = true;
        }
        self
    }
}

/// Counts bodies that are still held by a consumer
struct BodyGuard(Arc<AtomicUsize>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock transport that replays scripted responses
///
/// Unscripted requests get an empty `200 OK`.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    open_bodies: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock with a single scripted response
    pub fn with_response(response: MockResponse) -> Self {
        let mock = Self::new();
        mock.push_response(response);
        mock
    }

    /// Queue a response for the next request
    pub fn push_response(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Bodies handed out and not yet dropped
    pub fn open_bodies(&self) -> usize {
        self.open_bodies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest, signal: &CancelSignal) -> Result<HttpResponse> {
        self.requests.lock().push(request);
        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockResponse::chunks::<Bytes>(200, vec![]));

        match response {
            MockResponse::Fail(message) => Err(WatchError::Transport(message)),
            MockResponse::Hang => Err(signal.fired().await.into()),
            MockResponse::Reply {
                status,
                chunks,
                keep_open,
                complete,
            } => {
                self.open_bodies.fetch_add(1, Ordering::SeqCst);
                let guard = BodyGuard(self.open_bodies.clone());

                let chunks = stream::iter(chunks.into_iter().map(Ok::<Bytes, WatchError>));
                let body = if keep_open {
                    chunks.chain(stream::pending()).boxed()
                } else {
                    chunks.boxed()
                };
                let body = body
                    .map(move |chunk| {
                        let _held = &guard;
                        chunk
                    })
                    .boxed();

                let code = reqwest::StatusCode::from_u16(status)
                    .map_err(|e| WatchError::Transport(e.to_string()))?;

                Ok(HttpResponse {
                    status,
                    reason: reason_phrase(code),
                    headers: HeaderMap::new(),
                    body,
                    complete,
                })
            }
        }
    }
}
