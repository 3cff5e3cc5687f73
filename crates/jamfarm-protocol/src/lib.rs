//! Session wire protocol for jamfarm.
//!
//! Pure, socket-free building blocks of a status fetch:
//!
//! - [`framing`]: the `type || LE32 length || body` envelope, for blocking
//!   and async byte streams
//! - [`auth`]: parsing the server challenge and deriving the login message
//! - [`aggregator`]: folding notifications into a [`jamfarm_core::StatusSnapshot`]
//!
//! # Example
//!
//! ```rust
//! use jamfarm_protocol::{aggregate, decode_message, encode_message, Message, MessageType};
//!
//! let config = Message::new(MessageType::ConfigChangeNotify, vec![120, 0, 16, 0]);
//! let bytes = encode_message(&config).unwrap();
//! let decoded = decode_message(&bytes).unwrap();
//!
//! let snapshot = aggregate([&decoded]).unwrap();
//! assert_eq!(snapshot.beats_per_minute, Some(120));
//! ```

pub mod aggregator;
pub mod auth;
mod error;
pub mod framing;
mod message;

pub use aggregator::{StatusAggregator, aggregate};
pub use auth::{AuthChallenge, Credential};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    FrameHeader, FrameReader, FrameWriter, HEADER_LEN, decode_message, encode_message, read_body,
    read_header, read_message, write_message,
};
pub use message::{Message, MessageType};
