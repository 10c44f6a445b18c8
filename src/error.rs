//! Error types for the ConnectLife bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error taxonomy for bridge operations.
///
/// The coordinator classifies failures through [`BridgeError::is_retryable`]
/// and [`BridgeError::is_auth_error`]: retryable errors are absorbed by the
/// polling grace window, auth errors abort the refresh cycle immediately.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication failures; never retried, require re-authentication
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema dictionary errors (missing or unreadable dictionary data)
    #[error("Dictionary error: {0}")]
    Dictionary(String),

    /// Appliance write/control errors
    #[error("Appliance control error: {0}")]
    ApplianceControl(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid input errors (write validation, unknown symbolic values)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found errors (devices, properties)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cloud service unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl BridgeError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a dictionary error
    pub fn dictionary<S: Into<String>>(msg: S) -> Self {
        Self::Dictionary(msg.into())
    }

    /// Create an appliance control error
    pub fn appliance_control<S: Into<String>>(msg: S) -> Self {
        Self::ApplianceControl(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Check if error is a transient communication failure worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Connection(_)
            | BridgeError::Timeout(_)
            | BridgeError::ServiceUnavailable(_) => true,
            // reqwest errors carry their own auth status; 401/403 are fatal
            BridgeError::Http(e) => !matches!(
                e.status().map(|s| s.as_u16()),
                Some(401) | Some(403)
            ),
            _ => false,
        }
    }

    /// Check if error indicates an authentication issue
    pub fn is_auth_error(&self) -> bool {
        match self {
            BridgeError::Authentication(_) => true,
            BridgeError::Http(e) => {
                matches!(e.status().map(|s| s.as_u16()), Some(401) | Some(403))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BridgeError::timeout("fetch").is_retryable());
        assert!(BridgeError::connection("reset").is_retryable());
        assert!(!BridgeError::authentication("expired").is_retryable());
        assert!(!BridgeError::invalid_input("bad value").is_retryable());
    }

    #[test]
    fn auth_classification() {
        assert!(BridgeError::authentication("expired").is_auth_error());
        assert!(!BridgeError::timeout("fetch").is_auth_error());
    }
}
