//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "presence-server", about = "Live visitor counter over WebSocket")]
pub struct Args {
    /// Path to a TOML config file (defaults to the platform config dir).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on, overriding config and `PORT`.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Tracing filter directive, e.g. `presence_hub=debug`.
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn parse() -> Args {
    Args::parse()
}
