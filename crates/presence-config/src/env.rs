//! Environment variable overrides applied on top of the file config.

use presence_common::ConfigError;
use tracing::info;

use crate::schema::PresenceConfig;

/// Listening port, kept compatible with existing deployments.
pub const PORT: &str = "PORT";
/// Interface to bind.
pub const HOST: &str = "PRESENCE_HOST";
/// Upgrade endpoint path.
pub const WS_PATH: &str = "PRESENCE_WS_PATH";

/// Apply overrides looked up through `lookup`.
///
/// Empty values are ignored so an exported-but-blank variable does not
/// wipe out the file setting.
pub fn apply_overrides<F>(config: &mut PresenceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = get(PORT) {
        config.server.port = port
            .trim()
            .parse()
            .map_err(|e| ConfigError::ParseError(format!("{PORT}={port}: {e}")))?;
        info!("server.port overridden from {PORT}");
    }
    if let Some(host) = get(HOST) {
        config.server.host = host.trim().to_string();
        info!("server.host overridden from {HOST}");
    }
    if let Some(path) = get(WS_PATH) {
        config.server.ws_path = path.trim().to_string();
        info!("server.ws_path overridden from {WS_PATH}");
    }

    Ok(())
}
