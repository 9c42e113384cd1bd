//! Client configuration with YAML support

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Watch client configuration
///
/// Can be loaded from YAML, JSON, or constructed programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connection settings
    pub connection: ConnectionConfig,

    /// TLS settings
    #[serde(default)]
    pub tls: TlsConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Transport implementation to use
    #[serde(default)]
    pub transport: TransportMode,
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the API server
    pub base_url: String,

    /// Authentication applied to every watch request
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Authentication scheme
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No credentials
    #[default]
    None,
    /// Static bearer token
    Bearer { token: String },
    /// Bearer token read from a file on every watch (service account tokens rotate)
    TokenFile { path: PathBuf },
}

/// TLS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM file with additional trusted root certificates
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Accept any server certificate
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Watch timeout in milliseconds when the caller sets none (default: 30s)
    #[serde(default = "default_watch_timeout")]
    pub watch_ms: u64,

    /// TCP keep-alive interval in milliseconds (default: 30s)
    #[serde(default = "default_keepalive")]
    pub keepalive_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            watch_ms: default_watch_timeout(),
            keepalive_ms: default_keepalive(),
        }
    }
}

impl TimeoutsConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn watch(&self) -> Duration {
        Duration::from_millis(self.watch_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_watch_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_keepalive() -> u64 {
    30_000 // 30 seconds
}

/// Which transport reads the response body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Read the body incrementally as it arrives
    #[default]
    Streaming,
    /// Read the whole body once, then split it
    Buffered,
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                connection: ConnectionConfig {
                    base_url: base_url.into(),
                    auth: AuthConfig::None,
                },
                tls: TlsConfig::default(),
                timeouts: TimeoutsConfig::default(),
                transport: TransportMode::default(),
            },
        }
    }

    /// Use a static bearer token
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.config.connection.auth = AuthConfig::Bearer {
            token: token.into(),
        };
        self
    }

    /// Read the bearer token from a file
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.connection.auth = AuthConfig::TokenFile { path: path.into() };
        self
    }

    /// Trust additional root certificates
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls.ca_file = Some(path.into());
        self
    }

    /// Skip server certificate verification
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.config.tls.insecure_skip_verify = skip;
        self
    }

    /// Set connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.connect_ms = ms;
        self
    }

    /// Set default watch timeout in milliseconds
    pub fn watch_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.watch_ms = ms;
        self
    }

    /// Set TCP keep-alive interval in milliseconds
    pub fn keepalive_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.keepalive_ms = ms;
        self
    }

    /// Select the transport implementation
    pub fn transport(mut self, mode: TransportMode) -> Self {
        self.config.transport = mode;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
