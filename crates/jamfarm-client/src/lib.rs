//! Status fetching over TCP, caching, configuration and CLI.
//!
//! This crate provides the `jamfarm` command-line interface and the I/O
//! shell around the pure protocol in `jamfarm-protocol`.

pub mod cache;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod secret;
pub mod session;

pub use cache::{CacheEntry, StatusCache};
pub use cli::Cli;
pub use client::{ClientOptions, StatusClient};
pub use error::{ClientError, ClientResult};
pub use fetcher::{CachedFetcher, StatusFetcher};
pub use session::{ConnectionState, StatusSession};
