//! Folds the post-login notification stream into a [`StatusSnapshot`].
//!
//! Server text (topic, nicknames, channel names, rejection messages) is
//! decoded with a configurable encoding. Older servers commonly send
//! Shift_JIS; the default is UTF-8. Undecodable bytes become U+FFFD.

use encoding_rs::{Encoding, UTF_8};
use jamfarm_core::{StatusSnapshot, UserEntry};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, MessageType};

/// Opaque per-user prefix in a userinfo record (active flag, channel index,
/// volume, pan, flags).
pub const USERINFO_PREFIX_LEN: usize = 6;

/// Detail used when a rejection carries no server text.
pub const DEFAULT_REJECTION: &str = "invalid login to server";

const TOPIC_COMMAND: &[u8] = b"TOPIC";

/// Streaming reducer over session notifications.
///
/// Fields of the snapshot start absent and are overwritten by the latest
/// notification of each kind. A fresh aggregator is used per connection.
#[derive(Debug)]
pub struct StatusAggregator {
    snapshot: StatusSnapshot,
    applied: usize,
    encoding: &'static Encoding,
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self {
            snapshot: StatusSnapshot::default(),
            applied: 0,
            encoding: UTF_8,
        }
    }
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: decode server text with `encoding`.
    #[must_use]
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Applies one message to the snapshot.
    ///
    /// Returns [`ProtocolError::AuthRejected`] for an auth reply; the caller
    /// must stop feeding messages at that point. Every other message type is
    /// either folded in or ignored.
    pub fn apply(&mut self, message: &Message) -> ProtocolResult<()> {
        self.applied += 1;

        match message.message_type() {
            MessageType::AuthReply => {
                let detail = parse_rejection(message.body(), self.encoding);
                debug!(%detail, "login rejected");
                return Err(ProtocolError::AuthRejected(detail));
            }
            MessageType::ConfigChangeNotify => match parse_config(message.body()) {
                Some((bpm, bpi)) => {
                    debug!(bpm, bpi, "tempo changed");
                    self.snapshot.beats_per_minute = Some(bpm);
                    self.snapshot.beats_per_interval = Some(bpi);
                }
                None => warn!(len = message.len(), "ignoring short config notification"),
            },
            MessageType::UserInfoChangeNotify => match parse_userinfo(message.body(), self.encoding) {
                Some(users) => {
                    debug!(users = users.len(), "roster replaced");
                    self.snapshot.users = users;
                }
                None => warn!(len = message.len(), "ignoring malformed userinfo notification"),
            },
            MessageType::ChatMessage => {
                if let Some(topic) = parse_topic(message.body(), self.encoding) {
                    debug!(%topic, "topic changed");
                    self.snapshot.topic = Some(topic);
                }
            }
            other => debug!(kind = %other, len = message.len(), "ignoring message"),
        }

        Ok(())
    }

    /// Current state of the snapshot.
    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Number of messages applied so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Consumes the aggregator, returning the final snapshot.
    pub fn finish(self) -> StatusSnapshot {
        self.snapshot
    }
}

/// Folds a complete message sequence.
///
/// Stops at the first rejection; nothing accumulated before it is returned.
pub fn aggregate<'a, I>(messages: I) -> ProtocolResult<StatusSnapshot>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut aggregator = StatusAggregator::new();
    for message in messages {
        aggregator.apply(message)?;
    }
    Ok(aggregator.finish())
}

/// Parses `LE16 bpm || LE16 bpi`. Bytes past the first four are ignored.
pub fn parse_config(body: &[u8]) -> Option<(u16, u16)> {
    if body.len() < 4 {
        return None;
    }
    let bpm = u16::from_le_bytes([body[0], body[1]]);
    let bpi = u16::from_le_bytes([body[2], body[3]]);
    Some((bpm, bpi))
}

/// Parses a full roster. Returns `None` if a record is cut short.
///
/// Repeated usernames collect their channels in arrival order; an empty
/// channel still registers the user.
pub fn parse_userinfo(body: &[u8], encoding: &'static Encoding) -> Option<BTreeMap<String, UserEntry>> {
    let mut users: BTreeMap<String, UserEntry> = BTreeMap::new();
    let mut rest = body;

    while !rest.is_empty() {
        rest = rest.get(USERINFO_PREFIX_LEN..)?;
        let (username, after_name) = take_cstr(rest, encoding)?;
        let (channel, after_channel) = take_cstr(after_name, encoding)?;
        rest = after_channel;

        let entry = users
            .entry(username.clone())
            .or_insert_with(|| UserEntry::new(username));
        if !channel.is_empty() {
            entry.channels.push(channel);
        }
    }

    Some(users)
}

/// Returns the new topic for a `TOPIC` chat command.
///
/// The originator field is skipped. A command without the topic field yields
/// `None`.
pub fn parse_topic(body: &[u8], encoding: &'static Encoding) -> Option<String> {
    let mut fields = body.split(|&b| b == 0);
    if fields.next()? != TOPIC_COMMAND {
        return None;
    }
    let _originator = fields.next()?;
    let topic = fields.next()?;
    Some(decode_text(topic, encoding))
}

fn parse_rejection(body: &[u8], encoding: &'static Encoding) -> String {
    body.get(1..)
        .and_then(|rest| take_cstr(rest, encoding).map(|(text, _)| text))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| DEFAULT_REJECTION.to_string())
}

/// Splits a NUL-terminated string off the front of `bytes`.
fn take_cstr<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Option<(String, &'a [u8])> {
    let nul = bytes.iter().position(|&b| b == 0)?;
    Some((decode_text(&bytes[..nul], encoding), &bytes[nul + 1..]))
}

fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, malformed) = encoding.decode_without_bom_handling(bytes);
    if malformed {
        debug!(encoding = encoding.name(), len = bytes.len(), "replaced undecodable server text");
    }
    text.into_owned()
}
