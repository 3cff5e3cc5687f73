//! Wire message type codes and the message envelope.

use std::fmt;

/// Message type code carried in the first byte of every frame.
///
/// Unknown codes are preserved as [`MessageType::Unknown`] so that newer
/// servers can send notification types this client does not understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Server → client, first message of a session.
    AuthChallenge,
    /// Server → client, answer to the login attempt.
    AuthReply,
    /// Server → client, tempo settings.
    ConfigChangeNotify,
    /// Server → client, full roster of users and channels.
    UserInfoChangeNotify,
    /// Server → client, start of an audio interval download.
    DownloadIntervalBegin,
    /// Server → client, audio interval payload.
    DownloadIntervalWrite,
    /// Client → server, login.
    AuthUser,
    /// Client → server, subscription mask.
    SetUsermask,
    /// Client → server, channel announcement.
    SetChannel,
    /// Client → server, start of an audio interval upload.
    UploadIntervalBegin,
    /// Client → server, audio interval payload.
    UploadIntervalWrite,
    /// Either direction, chat and server commands.
    ChatMessage,
    /// Either direction, keepalive.
    Keepalive,
    /// Either direction, extension envelope.
    Extended,
    /// Reserved invalid marker.
    Invalid,
    /// Any code not listed above.
    Unknown(u8),
}

impl MessageType {
    /// Returns the wire code for this type.
    pub fn code(self) -> u8 {
        match self {
            Self::AuthChallenge => 0x00,
            Self::AuthReply => 0x01,
            Self::ConfigChangeNotify => 0x02,
            Self::UserInfoChangeNotify => 0x03,
            Self::DownloadIntervalBegin => 0x04,
            Self::DownloadIntervalWrite => 0x05,
            Self::AuthUser => 0x80,
            Self::SetUsermask => 0x81,
            Self::SetChannel => 0x82,
            Self::UploadIntervalBegin => 0x83,
            Self::UploadIntervalWrite => 0x84,
            Self::ChatMessage => 0xC0,
            Self::Keepalive => 0xFD,
            Self::Extended => 0xFE,
            Self::Invalid => 0xFF,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u8> for MessageType {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::AuthChallenge,
            0x01 => Self::AuthReply,
            0x02 => Self::ConfigChangeNotify,
            0x03 => Self::UserInfoChangeNotify,
            0x04 => Self::DownloadIntervalBegin,
            0x05 => Self::DownloadIntervalWrite,
            0x80 => Self::AuthUser,
            0x81 => Self::SetUsermask,
            0x82 => Self::SetChannel,
            0x83 => Self::UploadIntervalBegin,
            0x84 => Self::UploadIntervalWrite,
            0xC0 => Self::ChatMessage,
            0xFD => Self::Keepalive,
            0xFE => Self::Extended,
            0xFF => Self::Invalid,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind.code()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown(0x{:02X})", code),
            known => write!(f, "{:?}(0x{:02X})", known, known.code()),
        }
    }
}

/// A single framed message: type code plus opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    body: Vec<u8>,
}

impl Message {
    /// Creates a new message.
    pub fn new(message_type: impl Into<MessageType>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type: message_type.into(),
            body: body.into(),
        }
    }

    /// Creates a message with an empty body.
    pub fn empty(message_type: impl Into<MessageType>) -> Self {
        Self::new(message_type, Vec::new())
    }

    /// Returns the message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Returns the message body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Consumes the message, returning its body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}
