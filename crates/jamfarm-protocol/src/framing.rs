//! Type-length-value message framing.
//!
//! Every message on the wire is a 1-byte type code, a 4-byte little-endian
//! body length, then the body:
//!
//! ```text
//! +--------+------------------+------------------+
//! | type 1 | length (4 LE)    |  body            |
//! +--------+------------------+------------------+
//! ```
//!
//! A stream that ends before a full header is available has simply ended;
//! a stream that ends inside a body is a truncated frame. No upper bound is
//! placed on the declared length unless the caller asks for one.

use std::io::{self, Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, MessageType};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 5;

/// Upper bound on the up-front buffer reservation for a body.
///
/// Bodies larger than this still decode; the buffer just grows as bytes arrive
/// instead of trusting the declared length for the allocation.
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Encodes a message to its wire form.
///
/// # Example
///
/// ```rust
/// use jamfarm_protocol::{encode_message, Message, MessageType};
///
/// let bytes = encode_message(&Message::new(MessageType::Keepalive, Vec::new())).unwrap();
/// assert_eq!(bytes, vec![0xFD, 0, 0, 0, 0]);
/// ```
pub fn encode_message(message: &Message) -> ProtocolResult<Vec<u8>> {
    let len = u32::try_from(message.len()).map_err(|_| ProtocolError::MessageTooLarge {
        size: message.len(),
        max: u32::MAX as usize,
    })?;

    let mut buffer = Vec::with_capacity(HEADER_LEN + message.len());
    buffer.push(message.message_type().code());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(message.body());
    Ok(buffer)
}

/// Decodes one message from a buffer holding a complete frame.
///
/// Bytes past the end of the frame are ignored.
///
/// # Example
///
/// ```rust
/// use jamfarm_protocol::{decode_message, MessageType};
///
/// let msg = decode_message(&[0x02, 4, 0, 0, 0, 120, 0, 16, 0]).unwrap();
/// assert_eq!(msg.message_type(), MessageType::ConfigChangeNotify);
/// assert_eq!(msg.body(), &[120, 0, 16, 0]);
/// ```
pub fn decode_message(data: &[u8]) -> ProtocolResult<Message> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::IncompleteMessage {
            expected: HEADER_LEN,
            received: data.len(),
        });
    }

    let (message_type, len) = parse_header(&data[..HEADER_LEN]);
    let end = HEADER_LEN + len;

    if data.len() < end {
        return Err(ProtocolError::IncompleteMessage {
            expected: end,
            received: data.len(),
        });
    }

    Ok(Message::new(message_type, &data[HEADER_LEN..end]))
}

fn parse_header(header: &[u8]) -> (MessageType, usize) {
    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
    (MessageType::from(header[0]), len as usize)
}

/// Type and declared body length of a frame whose body is still unread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: MessageType,
    pub len: usize,
}

impl FrameHeader {
    fn parse(header: &[u8; HEADER_LEN]) -> Self {
        let (message_type, len) = parse_header(header);
        Self { message_type, len }
    }

    /// Pairs the header with its fully read body.
    pub fn into_message(self, body: Vec<u8>) -> Message {
        Message::new(self.message_type, body)
    }

    /// The error for a body that stopped after `received` bytes.
    pub fn truncated(&self, received: usize) -> ProtocolError {
        ProtocolError::Truncated {
            expected: self.len,
            received,
        }
    }
}

fn check_limit(len: usize, limit: Option<u32>) -> ProtocolResult<()> {
    match limit {
        Some(max) if len > max as usize => Err(ProtocolError::MessageTooLarge {
            size: len,
            max: max as usize,
        }),
        _ => Ok(()),
    }
}

/// Returns true if the error means the peer went away between frames.
fn is_end_of_stream(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

/// Maps an I/O error hit inside a frame body.
///
/// The peer hanging up mid-body cuts the frame short; anything else stays
/// an I/O failure.
fn body_error(err: io::Error, header: &FrameHeader, received: usize) -> ProtocolError {
    if is_end_of_stream(&err) {
        debug!(reason = %err.kind(), expected = header.len, received, "stream ended inside a frame body");
        header.truncated(received)
    } else {
        err.into()
    }
}

/// Reads framed messages from a blocking byte stream.
pub struct FrameReader<R> {
    reader: R,
    max_body_len: Option<u32>,
}

impl<R: Read> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_body_len: None,
        }
    }

    /// Builder: reject bodies larger than `max` bytes.
    pub fn with_max_body_len(mut self, max: u32) -> Self {
        self.max_body_len = Some(max);
        self
    }

    /// Reads a single framed message.
    ///
    /// Returns `Ok(None)` if the stream ends before a complete header.
    /// Returns an error if the stream ends inside the body.
    pub fn read_message(&mut self) -> ProtocolResult<Option<Message>> {
        let mut header = [0u8; HEADER_LEN];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if is_end_of_stream(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let header = FrameHeader::parse(&header);
        check_limit(header.len, self.max_body_len)?;

        let mut body = Vec::with_capacity(header.len.min(PREALLOC_LIMIT));
        if let Err(e) = (&mut self.reader)
            .take(header.len as u64)
            .read_to_end(&mut body)
        {
            return Err(body_error(e, &header, body.len()));
        }
        if body.len() < header.len {
            return Err(header.truncated(body.len()));
        }

        Ok(Some(header.into_message(body)))
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Unwraps this FrameReader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes framed messages to a blocking byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single framed message.
    pub fn write_message(&mut self, message: &Message) -> ProtocolResult<()> {
        let data = encode_message(message)?;
        self.writer.write_all(&data)?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Reads one framed message from an async byte stream.
///
/// Suspends until the full body is available. Returns `Ok(None)` when the
/// stream ends before a complete header, which is how a session normally
/// finishes.
pub async fn read_message<R>(reader: &mut R, max_body_len: Option<u32>) -> ProtocolResult<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let Some(header) = read_header(reader, max_body_len).await? else {
        return Ok(None);
    };
    let mut body = Vec::new();
    read_body(reader, &header, &mut body).await?;
    Ok(Some(header.into_message(body)))
}

/// Reads the next frame header, or `Ok(None)` if the stream ends first.
///
/// The declared length is checked against `max_body_len` before returning.
pub async fn read_header<R>(reader: &mut R, max_body_len: Option<u32>) -> ProtocolResult<Option<FrameHeader>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if is_end_of_stream(&e) => {
            debug!(reason = %e.kind(), "stream ended between frames");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let header = FrameHeader::parse(&header);
    check_limit(header.len, max_body_len)?;
    Ok(Some(header))
}

/// Reads the body announced by `header` into `body`.
///
/// Bytes are appended as they arrive, so if this future is dropped early
/// `body` holds what was received. A stream that ends or is reset before the
/// body is complete yields [`ProtocolError::Truncated`].
pub async fn read_body<R>(reader: &mut R, header: &FrameHeader, body: &mut Vec<u8>) -> ProtocolResult<()>
where
    R: AsyncRead + Unpin,
{
    body.reserve(header.len.saturating_sub(body.len()).min(PREALLOC_LIMIT));
    let remaining = header.len.saturating_sub(body.len()) as u64;
    if let Err(e) = (&mut *reader).take(remaining).read_to_end(body).await {
        return Err(body_error(e, header, body.len()));
    }
    if body.len() < header.len {
        return Err(header.truncated(body.len()));
    }

    trace!(kind = %header.message_type, len = header.len, "frame received");
    Ok(())
}

/// Writes one framed message to an async byte stream and flushes it.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let data = encode_message(message)?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    trace!(kind = %message.message_type(), len = message.len(), "frame sent");
    Ok(())
}
