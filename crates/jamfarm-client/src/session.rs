//! One status fetch over one connection.
//!
//! A session walks a fixed state machine:
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingChallenge -> Authenticating -> Aggregating -> Closed
//! ```
//!
//! Any failure jumps straight to `Closed`. The stream is shut down exactly
//! once, on whichever path leaves the session.

use std::fmt;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use jamfarm_core::{ServerAddress, StatusError, StatusSnapshot};
use jamfarm_protocol::{
    Credential, FrameHeader, Message, ProtocolError, ProtocolResult, StatusAggregator, auth,
    read_body, read_header, write_message,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::classify;

/// Lifecycle of a status session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingChallenge,
    Authenticating,
    Aggregating,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingChallenge => "awaiting_challenge",
            Self::Authenticating => "authenticating",
            Self::Aggregating => "aggregating",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens a TCP connection, bounded by `timeout`.
///
/// Refused connections, DNS failures and timeouts all map to
/// `ConnectFailed`.
pub async fn connect(address: &ServerAddress, timeout: Duration) -> Result<TcpStream, StatusError> {
    debug!(host = %address.host, port = address.port, state = %ConnectionState::Connecting, "connecting");

    let stream = tokio::time::timeout(
        timeout,
        TcpStream::connect((address.host.as_str(), address.port)),
    )
    .await
    .map_err(|_| {
        StatusError::connect_failed(format!(
            "connection to {} timed out after {}s",
            address,
            timeout.as_secs_f32()
        ))
    })?
    .map_err(|e| StatusError::connect_failed(format!("failed to connect to {}: {}", address, e)))?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "could not disable Nagle");
    }

    Ok(stream)
}

/// A connected session, generic over the byte stream so it can be driven
/// by a socket or an in-memory pipe.
pub struct StatusSession<S> {
    stream: Option<S>,
    state: ConnectionState,
    idle_timeout: Option<Duration>,
    max_message_size: Option<u32>,
    encoding: &'static Encoding,
}

impl<S> StatusSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            state: ConnectionState::Disconnected,
            idle_timeout: None,
            max_message_size: None,
            encoding: UTF_8,
        }
    }

    /// Builder: end aggregation after this long without a new frame.
    ///
    /// A frame whose body stalls for the same period is reported as
    /// truncated instead.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Builder: reject frames with larger bodies.
    pub fn with_max_message_size(mut self, max: Option<u32>) -> Self {
        self.max_message_size = max;
        self
    }

    /// Builder: decode server text with `encoding`.
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the handshake and aggregation to completion, then closes.
    pub async fn run(mut self, credential: &Credential) -> Result<StatusSnapshot, StatusError> {
        let result = self.drive(credential).await;
        if let Err(ref e) = result {
            debug!(state = %self.state, kind = e.kind.as_str(), "session failed");
        }
        self.close().await;
        result
    }

    async fn drive(&mut self, credential: &Credential) -> Result<StatusSnapshot, StatusError> {
        self.transition(ConnectionState::AwaitingChallenge);
        let first = self
            .next_message()
            .await
            .map_err(classify)?
            .ok_or_else(|| StatusError::challenge_invalid("connection closed before auth challenge"))?;

        self.transition(ConnectionState::Authenticating);
        let login = auth::begin(&first, credential).map_err(classify)?;
        self.send(&login).await.map_err(classify)?;

        self.transition(ConnectionState::Aggregating);
        let mut aggregator = StatusAggregator::new().with_encoding(self.encoding);
        while let Some(message) = self.next_message().await.map_err(classify)? {
            aggregator.apply(&message).map_err(classify)?;
        }

        debug!(messages = aggregator.applied(), "stream ended");
        Ok(aggregator.finish())
    }

    async fn next_message(&mut self) -> ProtocolResult<Option<Message>> {
        let limit = self.max_message_size;
        let idle = match self.state {
            ConnectionState::Aggregating => self.idle_timeout,
            _ => None,
        };
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let header = match idle {
            Some(idle) => match tokio::time::timeout(idle, read_header(stream, limit)).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!(idle_ms = idle.as_millis() as u64, "no frame within idle timeout");
                    return Ok(None);
                }
            },
            None => read_header(stream, limit).await?,
        };
        let Some(header) = header else {
            return Ok(None);
        };

        let mut body = Vec::new();
        match idle {
            Some(idle) => match tokio::time::timeout(idle, read_body(stream, &header, &mut body)).await {
                Ok(result) => result?,
                Err(_) => return Err(stalled(&header, body.len(), idle)),
            },
            None => read_body(stream, &header, &mut body).await?,
        }

        Ok(Some(header.into_message(body)))
    }

    async fn send(&mut self, message: &Message) -> ProtocolResult<()> {
        match self.stream.as_mut() {
            Some(stream) => write_message(stream, message).await,
            None => Err(std::io::Error::from(std::io::ErrorKind::NotConnected).into()),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!(error = %e, "error shutting down session stream");
            }
            self.transition(ConnectionState::Closed);
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

fn stalled(header: &FrameHeader, received: usize, idle: Duration) -> ProtocolError {
    warn!(
        kind = %header.message_type,
        expected = header.len,
        received,
        idle_ms = idle.as_millis() as u64,
        "frame body stalled"
    );
    header.truncated(received)
}
