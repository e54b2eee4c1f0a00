//! Config path resolution.

use std::path::PathBuf;

/// Directory name under the platform config dir.
const APP_DIR: &str = "visitor-presence";

/// Get the platform-specific default config file path, if the platform
/// has a config directory at all.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}
