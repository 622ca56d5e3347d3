//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Command-line overrides, applied on top of file and environment settings
#[derive(Debug, Default, Parser)]
#[command(name = "telnet-honeypot", version, about = "Low-interaction telnet honeypot")]
pub struct Cli {
    /// Configuration file (default: ./config.toml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// First port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of contiguous ports to listen on
    #[arg(short = 'n', long)]
    pub port_count: Option<u16>,

    /// Idle read timeout in seconds
    #[arg(short = 't', long)]
    pub idle_timeout: Option<u64>,

    /// Write session records to this file instead of stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Diagnostic log format: text, json or gcp
    #[arg(long)]
    pub log_format: Option<String>,

    /// Development mode: verbose text logging of every keystroke
    #[arg(long)]
    pub dev: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    /// First listening port
    pub port: u16,
    /// Ports listened on: `port..port + port_count`
    pub port_count: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub negotiation_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// Session record destination; stdout when unset
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn ports(&self) -> impl Iterator<Item = u16> {
        let start = self.port;
        (0..self.port_count).map(move |offset| start + offset)
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }
}

impl Config {
    /// Load defaults, then `config.toml` (or `--config`), then `HONEYPOT_*`
    /// environment variables, then command-line flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        Self::build(cli, Some(file))
    }

    /// Same layering as [`Config::load`] without touching the filesystem
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        Self::build(cli, None)
    }

    fn build(cli: &Cli, file: Option<(PathBuf, bool)>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 2323_i64)?
            .set_default("server.port_count", 1_i64)?
            .set_default("session.idle_timeout_secs", 30_i64)?
            .set_default("session.negotiation_timeout_secs", 10_i64)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default("dev_mode", false)?;

        if let Some((path, required)) = file {
            builder = builder.add_source(config::File::from(path).required(required));
        }

        let builder = builder
            .add_source(
                config::Environment::with_prefix("HONEYPOT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override_option("server.port", cli.port.map(i64::from))?
            .set_override_option("server.port_count", cli.port_count.map(i64::from))?
            .set_override_option(
                "session.idle_timeout_secs",
                cli.idle_timeout.map(|secs| secs as i64),
            )?
            .set_override_option(
                "logging.file",
                cli.log_file.as_ref().map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("logging.format", cli.log_format.clone())?
            .set_override_option("dev_mode", cli.dev.then_some(true))?;

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate server config
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Invalid port: 0 is not allowed");
        }
        if self.server.port_count == 0 {
            anyhow::bail!("port_count must be at least 1");
        }
        let last = u32::from(self.server.port) + u32::from(self.server.port_count) - 1;
        if last > u32::from(u16::MAX) {
            anyhow::bail!(
                "Port range {}+{} exceeds {}",
                self.server.port,
                self.server.port_count,
                u16::MAX
            );
        }

        // Validate session timeouts
        if self.session.idle_timeout_secs == 0 {
            anyhow::bail!("idle_timeout_secs must be greater than 0");
        }
        if self.session.negotiation_timeout_secs == 0 {
            anyhow::bail!("negotiation_timeout_secs must be greater than 0");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }
        let valid_formats = ["text", "json", "gcp"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging format '{}'. Must be one of: {:?}", self.logging.format, valid_formats);
        }

        Ok(())
    }
}
