//! Watch Client Library
//!
//! Streams change events for a collection of remote objects from a
//! long-lived HTTP response of newline-delimited JSON frames.
//!
//! # Example
//!
//! ```rust,no_run
//! use kwatch_client::{ClientConfig, WatchOptions, Watcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder("http://localhost:8001").build();
//!     let watcher = Watcher::from_config(&config)?;
//!
//!     let options = WatchOptions::new().label_selector("app=web");
//!     let mut events = watcher.watch::<serde_json::Value>("/api/v1/pods", &options)?;
//!
//!     while let Some(event) = events.next().await {
//!         let event = event?;
//!         println!("{} {:?}", event.kind(), event.resource_version());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Transports
//!
//! The watcher only depends on the [`Transport`] trait. The bundled
//! [`StreamingTransport`] reads the body incrementally; [`BufferedTransport`]
//! reads it whole. Any other HTTP stack can be plugged in by implementing
//! the trait.
//!
//! # Testing
//!
//! The `testing` module provides an axum-backed server for integration
//! tests, and [`transport::MockTransport`] replays scripted responses.

pub mod config;
pub mod connection;
pub mod decoder;
mod error;
pub mod event;
pub mod request;
pub mod testing;
pub mod transport;
mod watch;

pub use config::{AuthConfig, ClientConfig, ConfigError, TransportMode};
pub use connection::{Connection, ConnectionResolver, StaticResolver};
pub use error::{Result, WatchError};
pub use event::{Bookmark, EventKind, Status, WatchEvent};
pub use request::{CancelSignal, WatchOptions, WatchRequest};
pub use transport::{BufferedTransport, StreamingTransport, Transport};
pub use watch::{WatchStream, Watcher};

// Re-export the cancel handle type used by WatchOptions
pub use tokio_util::sync::CancellationToken;
