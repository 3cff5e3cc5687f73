//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jamfarm_core::OutputFormat;

use crate::config::ClientConfig;

/// Idle timeout applied by the CLI when none is configured, in seconds.
pub const CLI_IDLE_TIMEOUT: u64 = 3;

/// jamfarm - who is jamming right now
#[derive(Debug, Parser)]
#[command(name = "jamfarm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server to query, as host[:port] (defaults to server.address)
    pub server: Option<String>,

    /// Path to configuration file
    #[arg(long, short, env = "JAMFARM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    // --- Login flags ---
    /// Login name
    #[arg(long, short)]
    pub username: Option<String>,

    /// Password (supports env:: and pass:: references)
    #[arg(long, short, env = "JAMFARM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log in anonymously
    #[arg(long)]
    pub anonymous: bool,

    /// Encoding of server text (e.g. utf-8, shift_jis)
    #[arg(long)]
    pub encoding: Option<String>,

    // --- Output format flags ---
    /// Output an HTML fragment
    #[arg(long, group = "output_format")]
    pub html: bool,

    /// Output in JSON format
    #[arg(long, group = "output_format")]
    pub json: bool,

    /// Output in Waybar JSON format
    #[arg(long, group = "output_format")]
    pub waybar: bool,

    // --- Display options ---
    /// Maximum topic length (truncated with ellipsis)
    #[arg(long)]
    pub max_topic_length: Option<usize>,

    /// Text to show when nobody is connected
    #[arg(long)]
    pub no_users_text: Option<String>,

    // --- Connection flags ---
    /// Connect timeout in seconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Stop listening after this many quiet seconds
    #[arg(long, conflicts_with = "wait")]
    pub idle_timeout: Option<u64>,

    /// Keep listening until the server closes the connection
    #[arg(long)]
    pub wait: bool,

    /// Reject messages with bodies larger than this many bytes
    #[arg(long)]
    pub max_message_size: Option<u32>,

    /// Retry failed connections this many times
    #[arg(long, default_value = "0")]
    pub retries: u32,

    // --- Cache flags ---
    /// Always fetch, ignoring the status cache
    #[arg(long)]
    pub no_cache: bool,

    /// Cache freshness window in seconds
    #[arg(long)]
    pub cache_freshness: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Returns the output format selected by flags, if any.
    pub fn output_format(&self) -> Option<OutputFormat> {
        if self.html {
            Some(OutputFormat::Html)
        } else if self.json {
            Some(OutputFormat::Json)
        } else if self.waybar {
            Some(OutputFormat::Waybar)
        } else {
            None
        }
    }

    /// Overlays command-line values on top of the loaded configuration.
    pub fn apply_to(&self, config: &mut ClientConfig) {
        config.debug |= self.debug;

        if let Some(ref server) = self.server {
            config.server.address = server.clone();
        }
        if let Some(ref username) = self.username {
            config.server.username = username.clone();
        }
        if let Some(ref password) = self.password {
            config.server.password = password.clone();
        }
        config.server.anonymous |= self.anonymous;
        if let Some(ref encoding) = self.encoding {
            config.server.encoding = encoding.clone();
        }

        if let Some(format) = self.output_format() {
            config.display.format = format;
        }
        if self.max_topic_length.is_some() {
            config.display.max_topic_length = self.max_topic_length;
        }
        if let Some(ref text) = self.no_users_text {
            config.display.no_users_text = text.clone();
        }

        if let Some(timeout) = self.connect_timeout {
            config.connection.connect_timeout = timeout;
        }
        config.connection.idle_timeout = if self.wait {
            None
        } else {
            self.idle_timeout
                .or(config.connection.idle_timeout)
                .or(Some(CLI_IDLE_TIMEOUT))
        };
        if self.max_message_size.is_some() {
            config.connection.max_message_size = self.max_message_size;
        }

        if self.no_cache {
            config.cache.enabled = false;
        }
        if let Some(freshness) = self.cache_freshness {
            config.cache.freshness = freshness;
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
