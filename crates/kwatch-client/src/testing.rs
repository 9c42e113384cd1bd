//! Test utilities for kwatch-client
//!
//! Provides helpers for running integration tests against a local HTTP
//! server that speaks the watch protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::{ClientConfig, TransportMode};
use crate::error::Result;
use crate::watch::Watcher;

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Start a test server from an axum Router
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{routing::get, Router};
    /// use kwatch_client::testing::TestServer;
    ///
    /// let router = Router::new().route("/api/v1/pods", get(|| async {
    ///     "{\"type\":\"ADDED\",\"object\":{}}\n"
    /// }));
    /// let server = TestServer::start(router).await?;
    /// let watcher = server.watcher()?;
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        // Port 0: the OS picks a free port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(crate::WatchError::transport)?;
        let addr = listener.local_addr().map_err(crate::WatchError::transport)?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Let the accept loop get scheduled
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this server
    pub fn config(&self) -> ClientConfig {
        ClientConfig::builder(self.base_url())
            .connect_timeout_ms(2_000)
            .watch_timeout_ms(5_000)
            .build()
    }

    /// Watcher using the streaming transport
    pub fn watcher(&self) -> Result<Watcher> {
        Watcher::from_config(&self.config())
    }

    /// Watcher using the buffered transport
    pub fn buffered_watcher(&self) -> Result<Watcher> {
        let mut config = self.config();
        config.transport = TransportMode::Buffered;
        Watcher::from_config(&config)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Shared counter for observing server-side activity from tests
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<std::sync::atomic::AtomicUsize>);

impl Counter {
    pub fn increment(&self) {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_round_trip() {
        let router = axum::Router::new().route(
            "/api/v1/pods",
            axum::routing::get(|| async { "{\"type\":\"ADDED\",\"object\":{}}\n" }),
        );
        let server = TestServer::start(router).await.unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));

        for watcher in [server.watcher().unwrap(), server.buffered_watcher().unwrap()] {
            let mut stream = watcher
                .watch::<serde_json::Value>("/api/v1/pods", &crate::WatchOptions::new())
                .unwrap();
            let event = stream.next().await.unwrap().unwrap();
            assert_eq!(event.kind(), crate::EventKind::Added);
            assert!(stream.next().await.is_none());
        }

        server.shutdown().await;
    }

    #[test]
    fn test_counter() {
        let counter = Counter::default();
        let clone = counter.clone();
        counter.increment();
        clone.increment();
        clone.decrement();
        assert_eq!(counter.get(), 1);
    }
}
