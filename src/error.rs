//! Error types for respwire
//!
//! Provides a unified error type for decoding and transport operations.
//!
//! "Need more bytes" is never an error: the decoder reports it as `Ok(None)`.

use thiserror::Error;

/// Result type alias using RespError
pub type Result<T> = std::result::Result<T, RespError>;

/// Unified error type for respwire operations
#[derive(Debug, Error)]
pub enum RespError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Decode Errors
    // -------------------------------------------------------------------------
    /// The byte stream is desynchronized; the decoder must not be trusted further.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Reply Errors
    // -------------------------------------------------------------------------
    /// A well-formed `-` reply from the server. The connection stays healthy.
    #[error("{0}")]
    ErrorReply(String),

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("Can't resolve {host}: {reason}")]
    NameResolution { host: String, reason: String },

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Connection timed out: {0}")]
    ConnectTimeout(String),

    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("Timeout writing to the socket")]
    SendTimeout,

    #[error("Timeout reading from the socket")]
    ReceiveTimeout,

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl RespError {
    /// Send, receive or connect deadline elapsed; the caller may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RespError::SendTimeout | RespError::ReceiveTimeout | RespError::ConnectTimeout(_)
        )
    }

    /// The connection is gone or desynchronized and must be re-established.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            RespError::ConnectionReset | RespError::Protocol(_) | RespError::Io(_)
        )
    }

    /// The caller misused the API.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            RespError::InvalidTimeout(_) | RespError::NotConnected | RespError::InvalidEndpoint(_)
        )
    }

    /// Anything raised by the socket layer rather than by the protocol.
    pub fn is_transport(&self) -> bool {
        !matches!(self, RespError::Protocol(_) | RespError::ErrorReply(_))
    }
}
