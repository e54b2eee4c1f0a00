use serde::Deserialize;

/// Presence hub tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Frames queued per visitor before the visitor is treated as gone.
    pub outbound_buffer: u32,
    /// Seconds between visitor-count log lines. `0` disables them.
    pub stats_interval: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 32,
            stats_interval: 60,
        }
    }
}
