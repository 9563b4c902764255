use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Quarry analytics service
#[derive(Debug, Parser)]
#[command(name = "quarry", about = "Quota-aware natural-language analytics over a read-only SQL store")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "quarry.toml", env = "QUARRY_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "QUARRY_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Log filter directive, e.g. `info` or `quarry_analyst=debug,info`
    #[arg(long, default_value = "info", env = "QUARRY_LOG")]
    pub log: String,
}
