//! Command-line argument parsing

use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chatsales-server",
    about = "Chat sales extractor server",
    version,
    long_about = "Turns exported chat logs into structured, audited sale records \
                  and exports them as CSV."
)]
pub struct Args {
    /// Path to an optional TOML configuration file
    #[arg(
        short,
        long,
        env = "CHATSALES_CONFIG",
        default_value = "chatsales.toml"
    )]
    pub config: PathBuf,

    /// HTTP server port, overrides `server.port`
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Enable JSON log format
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl Args {
    /// The config file may be missing, but not a directory.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.config.is_dir() {
            bail!("config path {} is a directory", self.config.display());
        }
        Ok(())
    }
}
