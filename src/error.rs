//! Error taxonomy for sync and health operations.
//!
//! Auth failures (`NoAuthToken`, `Unauthorized`) are surfaced distinctly so
//! the host app can trigger re-authentication; every other sync failure is
//! transient and eligible for scheduler-level retry. Health failures never
//! propagate past the adapter — they are logged and degrade to empty results.

use thiserror::Error;

/// Failures of the background sync path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No token in the durable store (neither primary nor legacy key)
    #[error("No auth token")]
    NoAuthToken,

    /// The server rejected the token; the host must re-authenticate
    #[error("Unauthorized (token expired)")]
    Unauthorized,

    /// The 30 s upload deadline fired and the request was abandoned
    #[error("Request timeout")]
    Timeout,

    /// Non-2xx response; `message` is the server-provided message or a
    /// generic `HTTP <status>` string
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Transport-level failure (DNS, connect, TLS, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// Durable storage failure
    #[error("Storage error: {0}")]
    Store(String),
}

impl SyncError {
    /// True for failures that require re-authentication rather than retry.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::NoAuthToken | SyncError::Unauthorized)
    }

    /// True for failures the scheduler may retry with backoff.
    pub fn is_transient(&self) -> bool {
        !self.is_auth()
    }
}

/// Failures of a platform health store bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    /// No health store on this platform
    #[error("Health data not available")]
    Unavailable,

    /// The user denied (or has not granted) read access
    #[error("Health data permission denied")]
    PermissionDenied,

    /// The platform store failed mid-query
    #[error("Health store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_stable() {
        assert_eq!(SyncError::NoAuthToken.to_string(), "No auth token");
        assert_eq!(
            SyncError::Unauthorized.to_string(),
            "Unauthorized (token expired)"
        );
        assert_eq!(SyncError::Timeout.to_string(), "Request timeout");
        assert_eq!(
            SyncError::Http {
                status: 503,
                message: "HTTP 503".to_string()
            }
            .to_string(),
            "HTTP 503"
        );
    }

    #[test]
    fn test_auth_errors_are_not_transient() {
        assert!(SyncError::NoAuthToken.is_auth());
        assert!(SyncError::Unauthorized.is_auth());
        assert!(!SyncError::Timeout.is_auth());
        assert!(SyncError::Timeout.is_transient());
        assert!(SyncError::Network("reset".to_string()).is_transient());
        assert!(!SyncError::Unauthorized.is_transient());
    }
}
