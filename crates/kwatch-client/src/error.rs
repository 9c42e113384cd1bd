//! Error types for watch operations

use thiserror::Error;

/// Result type alias for watch operations
pub type Result<T> = std::result::Result<T, WatchError>;

/// Terminal failures of a watch invocation
///
/// Malformed frames never show up here: the frame decoder drops them and
/// keeps reading.
#[derive(Error, Debug)]
pub enum WatchError {
    /// No connection could be resolved
    #[error("No active connection configured")]
    NoConnection,

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Option key not recognized by the request builder
    #[error("Unknown watch option: {0}")]
    UnknownOption(String),

    /// Option value could not be interpreted
    #[error("Invalid value for watch option {option}: {value}")]
    InvalidOption { option: String, value: String },

    /// Applying authentication to the request failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server answered with a status other than 200
    #[error("Server error {status} {reason}: {body}")]
    Server {
        status: u16,
        reason: String,
        body: String,
    },

    /// Connection-level failure (DNS, refused, TLS, broken body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The caller cancelled the watch
    #[error("Watch cancelled")]
    Cancelled,

    /// The watch timeout elapsed
    #[error("Watch timed out")]
    Timeout,
}

impl WatchError {
    /// Create a protocol error from a status line and raw body
    pub fn server(status: u16, reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Server {
            status,
            reason: reason.into(),
            body: body.into(),
        }
    }

    /// Create a transport error from any underlying cause
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    /// HTTP status code, if the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for `Cancelled` and `Timeout`
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout)
    }

    /// True for failures raised before any network activity
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoConnection
                | Self::InvalidUrl(_)
                | Self::UnknownOption(_)
                | Self::InvalidOption { .. }
        )
    }
}

impl From<reqwest::Error> for WatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_server_errors() {
        let err = WatchError::server(410, "Gone", "too old resource version");
        assert_eq!(err.status(), Some(410));
        assert_eq!(
            err.to_string(),
            "Server error 410 Gone: too old resource version"
        );

        assert_eq!(WatchError::transport("connection refused").status(), None);
        assert_eq!(WatchError::Timeout.status(), None);
    }

    #[test]
    fn test_classification() {
        assert!(WatchError::Cancelled.is_cancellation());
        assert!(WatchError::Timeout.is_cancellation());
        assert!(!WatchError::NoConnection.is_cancellation());
        assert!(WatchError::NoConnection.is_configuration());
        assert!(WatchError::UnknownOption("limit".into()).is_configuration());
        assert!(!WatchError::server(500, "Internal Server Error", "").is_configuration());
    }
}
