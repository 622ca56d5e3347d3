//! Telnet honeypot - captures credentials and keystroke timing from
//! would-be attackers on a fake device console

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use telnet_honeypot::config::{Cli, Config, LoggingConfig};
use telnet_honeypot::{handlers, records};

/// How long to wait for open sessions and the record writer on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging(logging: &LoggingConfig, dev_mode: bool) {
    let level = if dev_mode { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Use format=gcp for structured GCP Cloud Logging
    match logging.format.to_lowercase().as_str() {
        "gcp" if !dev_mode => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" if !dev_mode => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    init_logging(&config.logging, config.dev_mode);

    info!("Starting telnet honeypot...");
    if config.dev_mode {
        info!("Development mode enabled");
    }

    let destination = records::open_destination(config.logging.file.as_deref()).await?;
    let (records_tx, writer_task) = records::start_record_writer(destination);

    let shutdown = CancellationToken::new();
    let listeners = handlers::start_all(&config, records_tx, shutdown.clone()).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    shutdown.cancel();

    for listener in listeners {
        let _ = listener.await;
    }

    // The writer exits once every session has dropped its sender
    if tokio::time::timeout(DRAIN_TIMEOUT, writer_task).await.is_err() {
        warn!("Record writer did not drain within {:?}", DRAIN_TIMEOUT);
    }

    Ok(())
}
