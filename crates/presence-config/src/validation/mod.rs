//! Full configuration validation.
//!
//! Each section has its own validator; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;


use crate::schema::PresenceConfig;
use presence_common::ConfigError;

use helpers::validate_range;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &PresenceConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server(&mut errors, config);
    validate_hub(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_server(errors: &mut Vec<String>, config: &PresenceConfig) {
    let server = &config.server;

    if server.host.trim().is_empty() {
        errors.push("server.host must not be empty".into());
    }
    validate_range(errors, "server.port", u32::from(server.port), 1, 65535);

    if !server.ws_path.starts_with('/') {
        errors.push(format!(
            "server.ws_path = {:?} must start with '/'",
            server.ws_path
        ));
    }
    if server.ws_path.chars().any(char::is_whitespace) {
        errors.push(format!(
            "server.ws_path = {:?} must not contain whitespace",
            server.ws_path
        ));
    }
}

/// One slot for the frame being written plus one for the next count.
const MIN_OUTBOUND_BUFFER: u32 = 2;

fn validate_hub(errors: &mut Vec<String>, config: &PresenceConfig) {
    validate_range(
        errors,
        "hub.outbound_buffer",
        config.hub.outbound_buffer,
        MIN_OUTBOUND_BUFFER,
        4096,
    );
    validate_range(
        errors,
        "hub.stats_interval",
        config.hub.stats_interval,
        0,
        86_400,
    );
}
