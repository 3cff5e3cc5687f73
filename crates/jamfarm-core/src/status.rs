//! Session status types.
//!
//! A [`StatusSnapshot`] is the point-in-time view of a jam session server
//! assembled from the notifications it pushes after login. Fields that the
//! server never reported stay `None` so renderers can tell "never reported"
//! apart from "reported as empty".

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default TCP port of a session server.
pub const DEFAULT_PORT: u16 = 2049;

/// A session server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServerAddress {
    /// Creates a new server address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the `host:port` key used to identify this server in caches.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Errors produced when parsing a `host[:port]` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    /// The host part is empty.
    #[error("server address is empty")]
    EmptyHost,

    /// The port part is not a valid port number.
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    /// An IPv6 literal was opened with `[` but never closed.
    #[error("unterminated IPv6 literal: {0:?}")]
    UnterminatedBracket(String),
}

impl FromStr for ServerAddress {
    type Err = AddressParseError;

    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// The port defaults to [`DEFAULT_PORT`] when omitted. An unbracketed
    /// string with more than one `:` is a bare IPv6 literal and takes the
    /// default port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| AddressParseError::UnterminatedBracket(s.to_string()))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(AddressParseError::InvalidPort(tail.to_string())),
            }
        } else if s.matches(':').count() > 1 {
            (s, None)
        } else {
            match s.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(AddressParseError::EmptyHost);
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| AddressParseError::InvalidPort(p.to_string()))?,
            None => DEFAULT_PORT,
        };

        Ok(Self::new(host, port))
    }
}

/// A connected user and the channels they are sending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Nickname as reported by the server.
    pub nickname: String,
    /// Channel names in arrival order.
    pub channels: Vec<String>,
}

impl UserEntry {
    /// Creates a user entry with no channels.
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            channels: Vec::new(),
        }
    }

    /// Builder: append a channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }
}

/// Aggregated status of one session server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Current topic, if the server announced one.
    pub topic: Option<String>,
    /// Tempo in beats per minute.
    #[serde(rename = "bpm")]
    pub beats_per_minute: Option<u16>,
    /// Interval length in beats.
    #[serde(rename = "bpi")]
    pub beats_per_interval: Option<u16>,
    /// Roster keyed by nickname.
    pub users: BTreeMap<String, UserEntry>,
}

impl StatusSnapshot {
    /// Creates an empty snapshot with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of connected users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Looks up a user by nickname.
    pub fn user(&self, nickname: &str) -> Option<&UserEntry> {
        self.users.get(nickname)
    }

    /// Builder: set the topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Builder: set tempo fields.
    pub fn with_tempo(mut self, bpm: u16, bpi: u16) -> Self {
        self.beats_per_minute = Some(bpm);
        self.beats_per_interval = Some(bpi);
        self
    }

    /// Builder: add a user entry, replacing any entry with the same nickname.
    pub fn with_user(mut self, user: UserEntry) -> Self {
        self.users.insert(user.nickname.clone(), user);
        self
    }
}

/// Category of a failed status fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusErrorKind {
    /// TCP connect failed (DNS, refused, timeout).
    ConnectFailed,
    /// The first server message was not a well-formed auth challenge.
    AuthChallengeInvalid,
    /// The server refused the status credentials.
    AuthRejected,
    /// A frame was truncated or malformed.
    DecodeError,
    /// The caller aborted the fetch.
    Cancelled,
}

impl StatusErrorKind {
    /// Returns the stable identifier for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectFailed => "connect_failed",
            Self::AuthChallengeInvalid => "auth_challenge_invalid",
            Self::AuthRejected => "auth_rejected",
            Self::DecodeError => "decode_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns a short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConnectFailed => "connection failed",
            Self::AuthChallengeInvalid => "invalid auth challenge",
            Self::AuthRejected => "login rejected",
            Self::DecodeError => "protocol error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StatusErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal outcome of a failed status fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct StatusError {
    /// What went wrong.
    pub kind: StatusErrorKind,
    /// Underlying error text.
    pub detail: String,
}

impl StatusError {
    /// Creates a new status error.
    pub fn new(kind: StatusErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Creates a connect failure.
    pub fn connect_failed(detail: impl Into<String>) -> Self {
        Self::new(StatusErrorKind::ConnectFailed, detail)
    }

    /// Creates an invalid challenge error.
    pub fn challenge_invalid(detail: impl Into<String>) -> Self {
        Self::new(StatusErrorKind::AuthChallengeInvalid, detail)
    }

    /// Creates a login rejection.
    pub fn auth_rejected(detail: impl Into<String>) -> Self {
        Self::new(StatusErrorKind::AuthRejected, detail)
    }

    /// Creates a decode error.
    pub fn decode(detail: impl Into<String>) -> Self {
        Self::new(StatusErrorKind::DecodeError, detail)
    }

    /// Creates a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(StatusErrorKind::Cancelled, "fetch aborted by caller")
    }

    /// Returns true if a whole-fetch retry may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind == StatusErrorKind::ConnectFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_and_port() {
        let addr: ServerAddress = "ninbot.com:2050".parse().unwrap();
        assert_eq!(addr, ServerAddress::new("ninbot.com", 2050));
        assert_eq!(addr.key(), "ninbot.com:2050");
    }

    #[test]
    fn parse_defaults_port() {
        let addr: ServerAddress = "localhost".parse().unwrap();
        assert_eq!(addr.port, DEFAULT_PORT);
    }

    #[test]
    fn parse_ipv6_literal() {
        let addr: ServerAddress = "[::1]:2050".parse().unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 2050);
        assert_eq!(addr.to_string(), "[::1]:2050");

        let bare: ServerAddress = "[fe80::1]".parse().unwrap();
        assert_eq!(bare.port, DEFAULT_PORT);
    }

    #[test]
    fn parse_unbracketed_ipv6_is_whole_host() {
        let addr: ServerAddress = "::1".parse().unwrap();
        assert_eq!(addr, ServerAddress::new("::1", DEFAULT_PORT));
        assert_eq!(addr.to_string(), "[::1]:2049");

        let addr: ServerAddress = "fe80::1:2050".parse().unwrap();
        assert_eq!(addr.host, "fe80::1:2050");
        assert_eq!(addr.port, DEFAULT_PORT);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            "".parse::<ServerAddress>(),
            Err(AddressParseError::EmptyHost)
        );
        assert_eq!(
            ":2050".parse::<ServerAddress>(),
            Err(AddressParseError::EmptyHost)
        );
        assert!(matches!(
            "host:http".parse::<ServerAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
        assert!(matches!(
            "host:70000".parse::<ServerAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
        assert!(matches!(
            "[::1".parse::<ServerAddress>(),
            Err(AddressParseError::UnterminatedBracket(_))
        ));
    }

    #[test]
    fn empty_snapshot_has_nothing_reported() {
        let snapshot = StatusSnapshot::new();
        assert!(snapshot.topic.is_none());
        assert!(snapshot.beats_per_minute.is_none());
        assert!(snapshot.beats_per_interval.is_none());
        assert_eq!(snapshot.user_count(), 0);
    }

    #[test]
    fn snapshot_serializes_absent_fields_as_null() {
        let json = serde_json::to_value(StatusSnapshot::new()).unwrap();
        assert!(json["topic"].is_null());
        assert!(json["bpm"].is_null());
        assert!(json["bpi"].is_null());
        assert!(json["users"].as_object().unwrap().is_empty());
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let snapshot = StatusSnapshot::new()
            .with_topic("Welcome")
            .with_tempo(120, 16)
            .with_user(UserEntry::new("alice").with_channel("guitar L"));

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: StatusSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn status_error_display() {
        let err = StatusError::auth_rejected("invalid login to server");
        assert_eq!(err.to_string(), "login rejected: invalid login to server");
        assert_eq!(err.kind.as_str(), "auth_rejected");
        assert!(!err.is_transient());
        assert!(StatusError::connect_failed("refused").is_transient());
    }
}
