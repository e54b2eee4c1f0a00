//! presence-server: live visitor counter over WebSocket.
//!
//! Accepts WebSocket upgrades on a single path and keeps every connected
//! visitor informed of how many visitors are online. Nothing is persisted;
//! the count lives in the hub task for the lifetime of the process.

mod cli;
mod stats;

use std::time::Duration;

use presence_config::PresenceConfig;
use presence_hub::{HubConfig, PresenceHub};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "presence_server=info,presence_hub=info,presence_config=info";

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let filter = match args.log_level.as_deref() {
        Some(directive) => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("presence-server v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match load(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Config load failed: {e}");
            std::process::exit(1);
        }
    };

    let hub = PresenceHub::spawn(HubConfig {
        outbound_buffer: config.hub.outbound_buffer as usize,
    });

    if config.hub.stats_interval > 0 {
        let interval = Duration::from_secs(u64::from(config.hub.stats_interval));
        tokio::spawn(stats::report(hub.clone(), interval, stats::log_count));
    }

    let listener = match presence_hub::bind(&config.server.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.server.bind_addr(), "Failed to bind: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(path = %config.server.ws_path, "Visitor endpoint ready");

    tokio::select! {
        _ = presence_hub::serve(listener, hub.clone(), &config.server.ws_path) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(visitors = hub.current_count(), "Shutting down");
        }
    }
}

/// Config file, then environment, then command-line overrides.
fn load(args: &cli::Args) -> presence_common::Result<PresenceConfig> {
    load_with(args, |key| std::env::var(key).ok())
}

fn load_with<F>(args: &cli::Args, lookup: F) -> presence_common::Result<PresenceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = presence_config::load_config_with(args.config.as_deref(), lookup)?;

    if let Some(port) = args.port {
        config.server.port = port;
        presence_config::validation::validate(&config)?;
    }

    tracing::info!(
        addr = %config.server.bind_addr(),
        outbound_buffer = config.hub.outbound_buffer,
        "Config loaded"
    );
    Ok(config)
}
