//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/jamfarm/config.toml` by default.
//!
//! The server password supports secret references:
//! - `pass::path/in/store`: resolved via `pass show`
//! - `env::VAR_NAME`: resolved from the environment
//! - plain text: used as-is

use std::path::{Path, PathBuf};
use std::time::Duration;

use encoding_rs::Encoding;
use jamfarm_core::{FormatOptions, OutputFormat, ServerAddress};
use jamfarm_protocol::Credential;
use serde::{Deserialize, Serialize};

use crate::cache::StatusCache;
use crate::client::ClientOptions;
use crate::error::{ClientError, ClientResult};

/// Configuration for the jamfarm client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Which server to query and how to log in.
    pub server: ServerSettings,

    /// Timeouts and frame limits.
    pub connection: ConnectionSettings,

    /// Status cache.
    pub cache: CacheSettings,

    /// Display settings.
    pub display: DisplaySettings,
}

/// Server and login settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// `host[:port]` of the session server.
    pub address: String,

    /// Login name.
    pub username: String,

    /// Password (supports `pass::` and `env::` prefixes).
    pub password: String,

    /// Log in as `anonymous:<username>`.
    pub anonymous: bool,

    /// Encoding of server text, as a WHATWG label (`utf-8`, `shift_jis`, ...).
    pub encoding: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            username: "status".to_string(),
            password: "status".to_string(),
            anonymous: false,
            encoding: "utf-8".to_string(),
        }
    }
}

/// Connection settings. Durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Bound on the connect phase.
    pub connect_timeout: u64,

    /// End the fetch after this long without a message.
    pub idle_timeout: Option<u64>,

    /// Largest accepted message body in bytes.
    pub max_message_size: Option<u32>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: 10,
            idle_timeout: None,
            max_message_size: None,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Freshness window in seconds.
    pub freshness: u64,

    /// Where cache files go. Defaults to the platform cache dir.
    pub directory: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            freshness: 5,
            directory: None,
        }
    }
}

/// Display settings for output formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Output format.
    pub format: OutputFormat,

    /// Maximum topic length (truncated with ellipsis).
    pub max_topic_length: Option<usize>,

    /// Text to show when nobody is connected.
    pub no_users_text: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            max_topic_length: None,
            no_users_text: "No users".to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if it does
    /// not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> ClientResult<Self> {
        toml::from_str(content)
            .map_err(|e| ClientError::config(format!("failed to parse config: {}", e)))
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> ClientResult<()> {
        self.address()?;
        self.encoding()?;
        if self.server.username.is_empty() {
            return Err(ClientError::config("server.username must not be empty"));
        }
        if self.connection.connect_timeout == 0 {
            return Err(ClientError::config(
                "connection.connect_timeout must be greater than 0",
            ));
        }
        if self.connection.idle_timeout == Some(0) {
            return Err(ClientError::config(
                "connection.idle_timeout must be greater than 0 when set",
            ));
        }
        Ok(())
    }

    /// Parsed server address.
    pub fn address(&self) -> ClientResult<ServerAddress> {
        Ok(self.server.address.parse::<ServerAddress>()?)
    }

    /// Server text encoding.
    pub fn encoding(&self) -> ClientResult<&'static Encoding> {
        Encoding::for_label(self.server.encoding.trim().as_bytes()).ok_or_else(|| {
            ClientError::config(format!("unknown server.encoding `{}`", self.server.encoding))
        })
    }

    /// Login credential with the password secret resolved.
    pub fn credential(&self) -> ClientResult<Credential> {
        let password = crate::secret::resolve(&self.server.password)?;
        Ok(Credential {
            username: self.server.username.clone(),
            password,
            anonymous: self.server.anonymous,
        })
    }

    pub fn client_options(&self) -> ClientResult<ClientOptions> {
        Ok(ClientOptions::default()
            .with_connect_timeout(Duration::from_secs(self.connection.connect_timeout))
            .with_idle_timeout(self.connection.idle_timeout.map(Duration::from_secs))
            .with_max_message_size(self.connection.max_message_size)
            .with_encoding(self.encoding()?))
    }

    pub fn format_options(&self) -> FormatOptions {
        FormatOptions {
            max_topic_length: self.display.max_topic_length,
            no_users_text: self.display.no_users_text.clone(),
            ..FormatOptions::default()
        }
    }

    /// Persistent status cache, or `None` when caching is disabled.
    pub fn status_cache(&self) -> Option<StatusCache> {
        if !self.cache.enabled {
            return None;
        }
        let directory = self
            .cache
            .directory
            .clone()
            .unwrap_or_else(Self::default_cache_dir);
        Some(StatusCache::new(Duration::from_secs(self.cache.freshness)).with_directory(directory))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jamfarm")
    }

    /// Returns the default cache directory.
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jamfarm")
    }
}
