//! Visitor presence service configuration.
//!
//! TOML-based configuration with environment overrides and full
//! validation. All sections use sensible defaults so a missing or
//! partial config file works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use presence_config::load_config;
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("listening on {}", config.server.bind_addr());
//! ```

pub mod env;
pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{HubConfig, PresenceConfig, ServerConfig};

use std::path::Path;

use presence_common::ConfigError;

/// Load config from `path` (or the platform default), apply environment
/// overrides from the process environment, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<PresenceConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`], with environment variables read through `lookup`.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<PresenceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };

    env::apply_overrides(&mut config, lookup)?;

    validation::validate(&config)?;
    Ok(config)
}
