//! Client error types.

use std::io;

use jamfarm_core::{AddressParseError, StatusError};
use jamfarm_protocol::ProtocolError;
use thiserror::Error;

use crate::secret::SecretError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client outside of a single fetch.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Server address could not be parsed.
    #[error("invalid server address: {0}")]
    Address(#[from] AddressParseError),

    /// Secret reference could not be resolved.
    #[error("secret resolution failed: {0}")]
    Secret(#[from] SecretError),

    /// Cache persistence error.
    #[error("cache error: {0}")]
    Cache(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The status fetch itself failed.
    #[error(transparent)]
    Status(#[from] StatusError),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }
}

/// Maps a protocol failure onto the fetch error taxonomy.
pub fn classify(err: ProtocolError) -> StatusError {
    match err {
        ProtocolError::Io(e) => StatusError::connect_failed(e.to_string()),
        ProtocolError::InvalidChallenge(detail) => StatusError::challenge_invalid(detail),
        ProtocolError::AuthRejected(detail) => StatusError::auth_rejected(detail),
        decode @ (ProtocolError::Truncated { .. }
        | ProtocolError::IncompleteMessage { .. }
        | ProtocolError::MessageTooLarge { .. }) => StatusError::decode(decode.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamfarm_core::StatusErrorKind;

    #[test]
    fn classify_covers_taxonomy() {
        let cases = [
            (
                ProtocolError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe")),
                StatusErrorKind::ConnectFailed,
            ),
            (
                ProtocolError::Truncated { expected: 4, received: 1 },
                StatusErrorKind::DecodeError,
            ),
            (
                ProtocolError::MessageTooLarge { size: 10, max: 5 },
                StatusErrorKind::DecodeError,
            ),
            (
                ProtocolError::InvalidChallenge("short".into()),
                StatusErrorKind::AuthChallengeInvalid,
            ),
            (
                ProtocolError::AuthRejected("nope".into()),
                StatusErrorKind::AuthRejected,
            ),
        ];

        for (err, kind) in cases {
            assert_eq!(classify(err).kind, kind);
        }
    }

    #[test]
    fn classify_keeps_detail() {
        let status = classify(ProtocolError::AuthRejected("server full".into()));
        assert_eq!(status.detail, "server full");
    }

    #[test]
    fn secret_error_keeps_its_type() {
        let err = ClientError::from(SecretError::EnvMissing("JAM_PW".into()));
        assert!(matches!(err, ClientError::Secret(SecretError::EnvMissing(ref var)) if var == "JAM_PW"));
        assert_eq!(
            err.to_string(),
            "secret resolution failed: environment variable `JAM_PW` is not set"
        );
    }

    #[test]
    fn status_error_is_transparent() {
        let err = ClientError::from(StatusError::auth_rejected("bad password"));
        assert_eq!(err.to_string(), StatusError::auth_rejected("bad password").to_string());
    }
}
