//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dumps the effective configuration, defaults included.
pub fn dump(config: &ClientConfig, source: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", source.display());
    println!("{}", toml_str);
    Ok(())
}

/// Validates the configuration without contacting Google.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    config.validate()?;

    match (&config.webhook.public_url, &config.webhook.tunnel_command) {
        (Some(url), _) => println!("Push notifications via {}.", url),
        (None, Some(command)) => println!("Push notifications via tunnel `{}`.", command),
        (None, None) => println!("No public URL or tunnel configured; polling only."),
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Shows the configuration file path.
pub fn path(source: &Path) -> ClientResult<()> {
    let marker = if source.exists() { "" } else { " (not found, using defaults)" };
    println!("config: {}{}", source.display(), marker);
    Ok(())
}
