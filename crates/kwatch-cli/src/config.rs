//! Configuration file handling for kwatch

use anyhow::{Context, Result};
use kwatch_client::{AuthConfig, ClientConfig};
use std::path::{Path, PathBuf};

/// Server used when neither the command line nor a config file names one
pub const DEFAULT_SERVER: &str = "http://localhost:8001";

/// Get the default config file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("kwatch");

    Ok(config_dir.join("config.yaml"))
}

/// Load configuration from a specific path
pub fn load_from(path: &Path) -> Result<ClientConfig> {
    ClientConfig::from_yaml_file(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))
}

/// Load the explicit config file, or the default one if it exists
pub fn load(path: Option<&Path>) -> Result<Option<ClientConfig>> {
    if let Some(path) = path {
        return load_from(path).map(Some);
    }

    match config_path() {
        Ok(default) if default.exists() => load_from(&default).map(Some),
        _ => Ok(None),
    }
}

/// Merge command line overrides over the loaded configuration
pub fn merge_with_args(
    config: Option<ClientConfig>,
    server: Option<&str>,
    token: Option<&str>,
) -> ClientConfig {
    let mut config = config.unwrap_or_else(|| ClientConfig::builder(DEFAULT_SERVER).build());

    if let Some(server) = server {
        config.connection.base_url = server.to_string();
    }
    if let Some(token) = token {
        config.connection.auth = AuthConfig::Bearer {
            token: token.to_string(),
        };
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = merge_with_args(None, None, None);
        assert_eq!(config.connection.base_url, DEFAULT_SERVER);
        assert_eq!(config.connection.auth, AuthConfig::None);
    }

    #[test]
    fn test_args_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            concat!(
                "connection:\n",
                "  base_url: https://cluster.local:6443\n",
                "  auth:\n",
                "    type: token_file\n",
                "    path: /var/run/token",
            )
        )
        .unwrap();

        let loaded = load(Some(file.path())).unwrap();
        let config = merge_with_args(loaded.clone(), None, None);
        assert_eq!(config.connection.base_url, "https://cluster.local:6443");
        assert!(matches!(config.connection.auth, AuthConfig::TokenFile { .. }));

        let config = merge_with_args(loaded, Some("http://127.0.0.1:8001"), Some("abc"));
        assert_eq!(config.connection.base_url, "http://127.0.0.1:8001");
        assert_eq!(
            config.connection.auth,
            AuthConfig::Bearer {
                token: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/kwatch.yaml"))).is_err());
    }
}
