//! Telnet honeypot handler: negotiation, banner and the fake login loop

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::records::RecordSender;
use crate::session::{EndReason, Session, SessionCounter, SessionInfo};
use crate::telnet::{negotiate, BANNER};

/// Per-connection timing and verbosity
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub negotiation_timeout: Duration,
    /// Log every received byte
    pub dev_mode: bool,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: config.session.idle_timeout(),
            negotiation_timeout: config.session.negotiation_timeout(),
            dev_mode: config.dev_mode,
        }
    }
}

/// Accept connections on `listener` until `shutdown` fires, one task per
/// connection.
pub async fn serve(
    listener: TcpListener,
    settings: SessionSettings,
    counter: Arc<SessionCounter>,
    records: RecordSender,
    shutdown: CancellationToken,
) {
    let local_port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            warn!("Telnet listener has no local address: {}", e);
            return;
        }
    };

    info!("Telnet honeypot started on port {}", local_port);

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer_addr)) => {
                let info = SessionInfo {
                    id: counter.next_id(),
                    remote: peer_addr,
                    local_port,
                };
                let session = Session::new(info, records.clone());
                let shutdown = shutdown.clone();

                tokio::spawn(async move {
                    handle_telnet_session(socket, session, settings, shutdown).await;
                });
            }
            Err(e) => {
                warn!("Telnet accept error on port {}: {}", local_port, e);
            }
        }
    }

    info!("Telnet listener on port {} stopped", local_port);
}

/// Drive one connection from negotiation to close.
///
/// The stream is released when this returns and the session's record is
/// queued when `session` drops, on every exit path.
pub async fn handle_telnet_session<S>(
    stream: S,
    mut session: Session,
    settings: SessionSettings,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!(
        session_id = session.id(),
        remote_addr = %session.info().remote,
        local_port = session.info().local_port,
        "Accepted connection"
    );

    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    let reason = tokio::select! {
        reason = run_session(&mut reader, &mut writer, &mut session, &settings) => reason,
        _ = shutdown.cancelled() => EndReason::Shutdown,
    };

    session.close(reason);
}

async fn run_session<R, W>(
    reader: &mut R,
    writer: &mut W,
    session: &mut Session,
    settings: &SessionSettings,
) -> EndReason
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let id = session.id();

    debug!(session_id = id, "Negotiating");
    if let Err(e) = negotiate(reader, writer, settings.negotiation_timeout).await {
        warn!(session_id = id, "Telnet negotiation failed: {}", e);
        return EndReason::NegotiationFailed;
    }

    if let Err(e) = send(writer, BANNER, settings.idle_timeout).await {
        warn!(session_id = id, "Telnet write banner failed: {}", e);
        return write_end_reason(&e);
    }
    session.mark_negotiated(Instant::now());
    debug!(session_id = id, "Banner sent, reading input");

    loop {
        let byte = match tokio::time::timeout(settings.idle_timeout, reader.read_u8()).await {
            Ok(Ok(byte)) => byte,
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(session_id = id, "Peer closed connection, closing socket");
                return EndReason::Disconnected;
            }
            Ok(Err(e)) => {
                warn!(session_id = id, "Read error, closing socket: {}", e);
                return EndReason::ReadError;
            }
            Err(_) => {
                warn!(session_id = id, "Read timeout, closing socket");
                return EndReason::IdleTimeout;
            }
        };

        if settings.dev_mode {
            debug!(session_id = id, input_byte = byte, "Input received");
        }

        let step = session.feed(byte, Instant::now());
        let Some(reply) = step.reply else {
            continue;
        };

        match send(writer, reply.bytes(), settings.idle_timeout).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                // Peer stopped reading
                warn!(session_id = id, "Write timeout, closing socket");
                return EndReason::IdleTimeout;
            }
            Err(e) if reply.is_best_effort() => {
                warn!(session_id = id, "Telnet echo failed: {}", e);
            }
            Err(e) => {
                warn!(session_id = id, "Telnet write prompt failed: {}", e);
                return EndReason::WriteFailed;
            }
        }
    }
}

fn write_end_reason(error: &io::Error) -> EndReason {
    match error.kind() {
        io::ErrorKind::TimedOut => EndReason::IdleTimeout,
        _ => EndReason::WriteFailed,
    }
}

/// Write and flush `bytes`, giving up with `TimedOut` after `timeout`
async fn send<W>(writer: &mut W, bytes: &[u8], timeout: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("write stalled for {:?}", timeout),
        )),
    }
}
