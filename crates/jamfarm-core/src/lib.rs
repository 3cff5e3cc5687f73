//! Core types: session status, server addresses, rendering, tracing

pub mod format;
pub mod status;
pub mod tracing;

pub use format::{
    FormatOptions, JsonOutput, OutputFormat, StatusFormatter, WaybarOutput, bulletize, ellipsis,
    html_escape,
};
pub use status::{
    AddressParseError, DEFAULT_PORT, ServerAddress, StatusError, StatusErrorKind, StatusSnapshot,
    UserEntry,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
