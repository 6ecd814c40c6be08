//! Error types for the Moonhunt client.

use thiserror::Error;

/// Errors that can occur when using the Moonhunt client.
#[derive(Debug, Error)]
pub enum MoonhuntError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to perform an HTTP request against the pull API.
    #[cfg(feature = "http-api")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected a pull-API request.
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Error message from the response body, or the status text.
        message: String,
    },

    /// Attempted an operation that requires an active connection, but the channel is not connected.
    #[error("not connected to a room")]
    NotConnected,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MoonhuntError {
    /// Returns true if this is an authentication failure from the pull API
    /// (missing or invalid admin/player token).
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }

    /// Returns true if this is a not-found failure from the pull API
    /// (unknown room code, player id, or game not started yet).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// A specialized [`Result`] type for Moonhunt client operations.
pub type Result<T> = std::result::Result<T, MoonhuntError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn api_error_classification() {
        let auth = MoonhuntError::Api {
            status: 403,
            message: "Unauthorized".to_string(),
        };
        assert!(auth.is_auth_error());
        assert!(!auth.is_not_found());

        let missing = MoonhuntError::Api {
            status: 404,
            message: "Room not found".to_string(),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_auth_error());

        let validation = MoonhuntError::Api {
            status: 400,
            message: "Room is full".to_string(),
        };
        assert!(!validation.is_auth_error());
        assert!(!validation.is_not_found());
    }

    #[test]
    fn display_includes_status_and_message() {
        let err = MoonhuntError::Api {
            status: 400,
            message: "Nickname already taken".to_string(),
        };
        assert_eq!(err.to_string(), "api error (400): Nickname already taken");
    }
}
