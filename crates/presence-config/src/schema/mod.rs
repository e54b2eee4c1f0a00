//! Configuration schema types.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod hub;
mod server;

pub use hub::*;
pub use server::*;

use serde::Deserialize;

/// Root configuration for the visitor presence service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub server: ServerConfig,
    pub hub: HubConfig,
}
