//! reqwest-backed transports

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::{debug, info};

use super::{reason_phrase, HttpRequest, HttpResponse, Transport};
use crate::config::ClientConfig;
use crate::error::{Result, WatchError};
use crate::request::CancelSignal;

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default TCP keep-alive interval
const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Build the shared reqwest client
///
/// No whole-request timeout is set: watches are long-lived and are bounded
/// by the per-watch cancel signal instead.
fn build_client(config: Option<&ClientConfig>) -> Result<Client> {
    let (connect_timeout, keepalive) = match config {
        Some(c) => (c.timeouts.connect(), c.timeouts.keepalive()),
        None => (DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE),
    };

    let mut builder = Client::builder()
        .connect_timeout(connect_timeout)
        .tcp_keepalive(keepalive);

    if let Some(config) = config {
        if let Some(ca_file) = &config.tls.ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| {
                WatchError::Transport(format!(
                    "Failed to read CA file {}: {}",
                    ca_file.display(),
                    e
                ))
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(certificate);
        }
        if config.tls.insecure_skip_verify {
            info!("TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    Ok(builder.build()?)
}

/// Issue the GET and wait for the status line, racing the cancel signal
async fn dispatch(
    client: &Client,
    request: HttpRequest,
    signal: &CancelSignal,
) -> Result<reqwest::Response> {
    let pending = client.get(request.url).headers(request.headers).send();

    tokio::select! {
        biased;
        reason = signal.fired() => {
            debug!("Watch request abandoned before response: {:?}", reason);
            Err(reason.into())
        }
        response = pending => Ok(response?),
    }
}

/// Transport that streams the body chunk by chunk
#[derive(Debug, Clone)]
pub struct StreamingTransport {
    client: Client,
}

impl StreamingTransport {
    /// Create a streaming transport with default settings
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(None)?,
        })
    }

    /// Create a streaming transport from client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(Some(config))?,
        })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for StreamingTransport {
    async fn send(&self, request: HttpRequest, signal: &CancelSignal) -> Result<HttpResponse> {
        let response = dispatch(&self.client, request, signal).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(WatchError::from).boxed();

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: reason_phrase(status),
            headers,
            body,
            complete: false,
        })
    }
}

/// Transport that reads the whole body before handing it over
///
/// For environments where incremental reads are unavailable. The watch only
/// produces events once the server closes the response.
#[derive(Debug, Clone)]
pub struct BufferedTransport {
    client: Client,
}

impl BufferedTransport {
    /// Create a buffered transport with default settings
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(None)?,
        })
    }

    /// Create a buffered transport from client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(Some(config))?,
        })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for BufferedTransport {
    async fn send(&self, request: HttpRequest, signal: &CancelSignal) -> Result<HttpResponse> {
        let response = dispatch(&self.client, request, signal).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = tokio::select! {
            biased;
            reason = signal.fired() => {
                debug!("Watch body read abandoned: {:?}", reason);
                return Err(reason.into());
            }
            body = response.bytes() => body?,
        };
        debug!("Read buffered watch body ({} bytes)", body.len());

        Ok(HttpResponse::whole(
            status.as_u16(),
            reason_phrase(status),
            headers,
            body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ca_file() {
        let config = ClientConfig::builder("https://localhost:6443")
            .ca_file("/nonexistent/ca.pem")
            .build();
        let err = StreamingTransport::from_config(&config).unwrap_err();
        assert!(matches!(err, WatchError::Transport(ref m) if m.contains("CA file")));
    }
}
