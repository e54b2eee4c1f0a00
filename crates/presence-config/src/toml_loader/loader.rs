//! Core TOML config loading: read from path or platform default.

use crate::schema::PresenceConfig;
use presence_common::ConfigError;
use std::path::Path;
use tracing::{debug, info};

use super::paths::default_config_path;

/// Load config from a specific TOML file path.
///
/// Deserializes the file using serde defaults for any missing fields.
/// Validation is left to the caller.
pub fn load_from_path(path: &Path) -> Result<PresenceConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: PresenceConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On macOS: `~/Library/Application Support/visitor-presence/config.toml`
/// On Linux: `~/.config/visitor-presence/config.toml`
///
/// A missing file (or an undeterminable config directory) yields defaults.
pub fn load_default() -> Result<PresenceConfig, ConfigError> {
    let Some(path) = default_config_path() else {
        debug!("no platform config directory, using defaults");
        return Ok(PresenceConfig::default());
    };

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            debug!("no config found at {}, using defaults", path.display());
            Ok(PresenceConfig::default())
        }
        Err(e) => Err(e),
    }
}
