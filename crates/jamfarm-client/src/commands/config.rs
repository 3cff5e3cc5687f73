//! Configuration commands.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::secret::SecretRef;

/// Dump the effective configuration to stdout.
///
/// The password is masked unless it is a secret reference.
pub fn dump(config: &ClientConfig) -> ClientResult<()> {
    let mut shown = config.clone();
    if !SecretRef::parse(&shown.server.password).is_reference() {
        shown.server.password = "********".to_string();
    }

    let toml_str = toml::to_string_pretty(&shown)
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ClientConfig::default_path().display());
    println!("{}", toml_str);
    Ok(())
}

/// Validate the configuration, including secret resolution.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    config.validate()?;
    config.credential()?;

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration and cache paths.
pub fn path(config: &ClientConfig) -> ClientResult<()> {
    println!("config: {}", ClientConfig::default_path().display());
    let cache_dir = config
        .cache
        .directory
        .clone()
        .unwrap_or_else(ClientConfig::default_cache_dir);
    println!("cache:  {}", cache_dir.display());
    Ok(())
}
