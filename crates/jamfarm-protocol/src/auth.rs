//! Login handshake.
//!
//! The server opens every session with an auth challenge. The client answers
//! with a single `AUTH_USER` message carrying a two-round binary SHA-1 of the
//! credentials salted with the challenge bytes:
//!
//! ```text
//! first  = SHA1(login ":" password)
//! second = SHA1(first || challenge)
//! body   = second || login || 0x00 || LE32(capabilities) || LE32(version)
//! ```
//!
//! Everything here is a pure transform over [`Message`] values; sending the
//! login is the caller's job.

use std::fmt;

use sha1::{Digest, Sha1};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, MessageType};

/// Number of challenge bytes at the start of the challenge body.
pub const CHALLENGE_LEN: usize = 8;

/// Smallest challenge body that can be parsed.
pub const MIN_CHALLENGE_BODY_LEN: usize = 16;

/// Capabilities word sent with every login.
pub const CLIENT_CAPABILITIES: u32 = 1;

/// Client protocol version sent with every login.
pub const CLIENT_VERSION: u32 = 0x0002_0000;

/// Prefix the server expects on anonymous login names.
pub const ANONYMOUS_PREFIX: &str = "anonymous:";

/// Length of a SHA-1 digest.
pub const PASS_HASH_LEN: usize = 20;

/// Parsed body of the server's first message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    challenge: [u8; CHALLENGE_LEN],
    server_capabilities: u32,
    protocol_version: u32,
    license: Vec<u8>,
}

impl AuthChallenge {
    /// Parses an auth challenge message.
    ///
    /// Fails with [`ProtocolError::InvalidChallenge`] when the message has the
    /// wrong type or its body is shorter than 16 bytes.
    pub fn parse(message: &Message) -> ProtocolResult<Self> {
        if message.message_type() != MessageType::AuthChallenge {
            return Err(ProtocolError::InvalidChallenge(format!(
                "expected AuthChallenge as first message, got {}",
                message.message_type()
            )));
        }

        let body = message.body();
        if body.len() < MIN_CHALLENGE_BODY_LEN {
            return Err(ProtocolError::InvalidChallenge(format!(
                "challenge body is {} bytes, need at least {}",
                body.len(),
                MIN_CHALLENGE_BODY_LEN
            )));
        }

        let mut challenge = [0u8; CHALLENGE_LEN];
        challenge.copy_from_slice(&body[..CHALLENGE_LEN]);

        Ok(Self {
            challenge,
            server_capabilities: read_u32_le(&body[8..12]),
            protocol_version: read_u32_le(&body[12..16]),
            license: body[MIN_CHALLENGE_BODY_LEN..].to_vec(),
        })
    }

    pub fn challenge(&self) -> &[u8; CHALLENGE_LEN] {
        &self.challenge
    }

    pub fn server_capabilities(&self) -> u32 {
        self.server_capabilities
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// License agreement text, if the server sent one.
    pub fn license(&self) -> Option<String> {
        let text = self.license.split(|&b| b == 0).next().unwrap_or_default();
        if text.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(text).into_owned())
        }
    }
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Login credentials for one fetch.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub anonymous: bool,
}

impl Credential {
    /// Creates a named-user credential.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            anonymous: false,
        }
    }

    /// Creates an anonymous credential with an empty password.
    pub fn anonymous(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: String::new(),
            anonymous: true,
        }
    }

    /// Name sent on the wire.
    pub fn login_name(&self) -> String {
        if self.anonymous {
            format!("{}{}", ANONYMOUS_PREFIX, self.username)
        } else {
            self.username.clone()
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("anonymous", &self.anonymous)
            .finish()
    }
}

/// Derives the salted password hash for a challenge.
pub fn pass_hash(credential: &Credential, challenge: &[u8; CHALLENGE_LEN]) -> [u8; PASS_HASH_LEN] {
    let mut first = Sha1::new();
    first.update(credential.login_name().as_bytes());
    first.update(b":");
    first.update(credential.password.as_bytes());
    let first = first.finalize();

    let mut second = Sha1::new();
    second.update(first);
    second.update(challenge);

    let mut hash = [0u8; PASS_HASH_LEN];
    hash.copy_from_slice(&second.finalize());
    hash
}

/// Builds the `AUTH_USER` message answering `challenge`.
pub fn login_message(credential: &Credential, challenge: &AuthChallenge) -> Message {
    let login = credential.login_name();
    let mut body = Vec::with_capacity(PASS_HASH_LEN + login.len() + 9);
    body.extend_from_slice(&pass_hash(credential, challenge.challenge()));
    body.extend_from_slice(login.as_bytes());
    body.push(0);
    body.extend_from_slice(&CLIENT_CAPABILITIES.to_le_bytes());
    body.extend_from_slice(&CLIENT_VERSION.to_le_bytes());
    Message::new(MessageType::AuthUser, body)
}

/// Consumes the server's first message and returns the login to send back.
///
/// # Example
///
/// ```rust
/// use jamfarm_protocol::{auth, Credential, Message, MessageType};
///
/// let mut body = vec![1, 2, 3, 4, 5, 6, 7, 8];
/// body.extend_from_slice(&[0; 8]);
/// let challenge = Message::new(MessageType::AuthChallenge, body);
///
/// let login = auth::begin(&challenge, &Credential::new("status", "status")).unwrap();
/// assert_eq!(login.message_type(), MessageType::AuthUser);
/// ```
pub fn begin(first: &Message, credential: &Credential) -> ProtocolResult<Message> {
    let challenge = AuthChallenge::parse(first)?;
    Ok(login_message(credential, &challenge))
}
