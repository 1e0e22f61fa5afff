//! Error types for vscp-client.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Error reported by the server in a `-OK` terminated response.
///
/// The payload line preceding the terminator carries `<code>,<description>`.
/// When the server sends no such line, `code` is `None` and the description
/// is taken from the terminator line itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Numeric error code, if the server supplied one.
    pub code: Option<u32>,
    /// Human readable description.
    pub description: String,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({})", self.description, code),
            None => f.write_str(&self.description),
        }
    }
}

/// Main error type for all vscp-client operations.
#[derive(Debug, Error)]
pub enum VscpError {
    /// I/O error on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 field in a response could not be decoded.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The connection was not established within the connect timeout.
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Operation requires a live connection.
    #[error("Not connected")]
    NotConnected,

    /// `connect` called on a live connection.
    #[error("Already connected")]
    AlreadyConnected,

    /// Connection closed before the command received its reply.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No data arrived within the idle timeout.
    #[error("Idle timeout after {0:?}")]
    IdleTimeout(Duration),

    /// Server answered with a negative terminator.
    #[error("Server error: {0}")]
    Server(ServerError),

    /// Caller supplied argument failed validation; nothing was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Command not allowed in the current connection state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Response payload did not match the command's grammar.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl VscpError {
    /// Server error details, if this is a protocol-level failure.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            VscpError::Server(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias using VscpError.
pub type Result<T> = std::result::Result<T, VscpError>;
