//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection closed in the middle of a frame body.
    #[error("truncated frame: expected {expected} body bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    /// Buffer does not hold a complete frame.
    #[error("incomplete message: expected {expected} bytes, got {received}")]
    IncompleteMessage { expected: usize, received: usize },

    /// Frame body exceeds a caller-imposed limit, or cannot be described by
    /// the 32-bit length field.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The first server message is not a usable auth challenge.
    #[error("invalid auth challenge: {0}")]
    InvalidChallenge(String),

    /// The server refused the credentials.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
}

impl ProtocolError {
    /// Returns true if this error came from a malformed or cut-off frame.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::IncompleteMessage { .. } | Self::MessageTooLarge { .. }
        )
    }
}
