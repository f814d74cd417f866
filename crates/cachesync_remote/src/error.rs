//! Error types for remote calls.

use thiserror::Error;

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors that can occur while talking to the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The remote source answered with an error status.
    #[error("remote returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// A response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Returns true for failures a later round may not hit again.
    ///
    /// The sync core never retries on its own; callers use this to decide
    /// whether scheduling another round is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Malformed(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            RemoteError::api(409, "conflict").to_string(),
            "remote returned 409: conflict"
        );
        assert_eq!(
            RemoteError::network("connection reset").to_string(),
            "network error: connection reset"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(RemoteError::network("timeout").is_transient());
        assert!(RemoteError::api(503, "unavailable").is_transient());
        assert!(RemoteError::api(429, "slow down").is_transient());
        assert!(!RemoteError::api(404, "gone").is_transient());
        assert!(!RemoteError::malformed("not json").is_transient());
    }
}
