//! Listener supervisor

pub mod telnet;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::records::RecordSender;
use crate::session::SessionCounter;

pub use telnet::{handle_telnet_session, serve, SessionSettings};

/// Bind every configured port. Any bind failure is fatal.
pub async fn bind_all(config: &Config) -> Result<Vec<TcpListener>> {
    let mut listeners = Vec::with_capacity(usize::from(config.server.port_count));
    for port in config.server.ports() {
        let addr = format!("{}:{}", config.server.host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Cannot bind Telnet to {}", addr))?;
        listeners.push(listener);
    }
    Ok(listeners)
}

/// Start an accept loop per listener, all sharing one session counter
pub fn serve_all(
    listeners: Vec<TcpListener>,
    settings: SessionSettings,
    records: RecordSender,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let counter = Arc::new(SessionCounter::new());

    listeners
        .into_iter()
        .map(|listener| {
            tokio::spawn(serve(
                listener,
                settings,
                counter.clone(),
                records.clone(),
                shutdown.clone(),
            ))
        })
        .collect()
}

/// Bind all configured ports and start serving them
pub async fn start_all(
    config: &Config,
    records: RecordSender,
    shutdown: CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    let listeners = bind_all(config).await?;
    let handles = serve_all(listeners, SessionSettings::from_config(config), records, shutdown);

    info!("Started {} telnet listeners", handles.len());
    Ok(handles)
}
