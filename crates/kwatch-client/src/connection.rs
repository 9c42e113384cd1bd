//! Connection resolution and request authentication

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use tracing::debug;
use url::Url;

use crate::config::{AuthConfig, ClientConfig};
use crate::error::{Result, WatchError};
use crate::transport::HttpRequest;

/// Target of watch requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Base URL that watch paths are resolved against
    pub base_url: Url,
}

/// Supplies the current connection and decorates requests with credentials
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    /// Current connection, or `None` when nothing is configured
    fn current_connection(&self) -> Option<Connection>;

    /// Inject credentials into an outbound request
    ///
    /// Called exactly once per watch invocation, before dispatch.
    async fn apply_authentication(&self, request: &mut HttpRequest) -> Result<()>;
}

/// Resolver with a fixed connection and authentication scheme
#[derive(Debug, Clone)]
pub struct StaticResolver {
    connection: Option<Connection>,
    auth: AuthConfig,
}

impl StaticResolver {
    /// Create a resolver for `base_url`
    pub fn new(base_url: Url, auth: AuthConfig) -> Self {
        Self {
            connection: Some(Connection { base_url }),
            auth,
        }
    }

    /// Create a resolver with no connection; every watch fails with
    /// [`WatchError::NoConnection`]
    pub fn disconnected() -> Self {
        Self {
            connection: None,
            auth: AuthConfig::None,
        }
    }

    /// Create a resolver from client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        if config.connection.base_url.trim().is_empty() {
            return Ok(Self::disconnected());
        }
        let base_url = Url::parse(&config.connection.base_url)?;
        Ok(Self::new(base_url, config.connection.auth.clone()))
    }
}

#[async_trait]
impl ConnectionResolver for StaticResolver {
    fn current_connection(&self) -> Option<Connection> {
        self.connection.clone()
    }

    async fn apply_authentication(&self, request: &mut HttpRequest) -> Result<()> {
        let token = match &self.auth {
            AuthConfig::None => return Ok(()),
            AuthConfig::Bearer { token } => token.clone(),
            AuthConfig::TokenFile { path } => {
                debug!("Reading bearer token from {}", path.display());
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    WatchError::Auth(format!(
                        "Failed to read token file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                content.trim().to_string()
            }
        };

        if token.is_empty() {
            return Err(WatchError::Auth("Empty bearer token".to_string()));
        }

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| WatchError::Auth(format!("Invalid auth token: {}", e)))?;
        value.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request() -> HttpRequest {
        HttpRequest::get(Url::parse("https://cluster.local/api/v1/pods?watch=true").unwrap())
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig::builder("https://cluster.local:6443").build();
        let resolver = StaticResolver::from_config(&config).unwrap();
        assert_eq!(
            resolver.current_connection().unwrap().base_url.as_str(),
            "https://cluster.local:6443/"
        );

        let config = ClientConfig::builder("").build();
        let resolver = StaticResolver::from_config(&config).unwrap();
        assert!(resolver.current_connection().is_none());

        let config = ClientConfig::builder("not a url").build();
        assert!(StaticResolver::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_no_auth_leaves_headers_alone() {
        let resolver = StaticResolver::new(
            Url::parse("https://cluster.local").unwrap(),
            AuthConfig::None,
        );
        let mut req = request();
        resolver.apply_authentication(&mut req).await.unwrap();
        assert!(req.headers.is_empty());
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let resolver = StaticResolver::new(
            Url::parse("https://cluster.local").unwrap(),
            AuthConfig::Bearer {
                token: "s3cr3t".to_string(),
            },
        );
        let mut req = request();
        resolver.apply_authentication(&mut req).await.unwrap();
        assert_eq!(req.headers.get(AUTHORIZATION).unwrap(), "Bearer s3cr3t");
        assert!(req.headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn test_token_file_is_read_on_every_call() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first-token").unwrap();

        let resolver = StaticResolver::new(
            Url::parse("https://cluster.local").unwrap(),
            AuthConfig::TokenFile {
                path: file.path().to_path_buf(),
            },
        );

        let mut req = request();
        resolver.apply_authentication(&mut req).await.unwrap();
        assert_eq!(req.headers.get(AUTHORIZATION).unwrap(), "Bearer first-token");

        std::fs::write(file.path(), "rotated-token\n").unwrap();
        let mut req = request();
        resolver.apply_authentication(&mut req).await.unwrap();
        assert_eq!(req.headers.get(AUTHORIZATION).unwrap(), "Bearer rotated-token");
    }

    #[tokio::test]
    async fn test_missing_token_file() {
        let resolver = StaticResolver::new(
            Url::parse("https://cluster.local").unwrap(),
            AuthConfig::TokenFile {
                path: "/nonexistent/token".into(),
            },
        );
        let err = resolver.apply_authentication(&mut request()).await.unwrap_err();
        assert!(matches!(err, WatchError::Auth(_)));
    }
}
