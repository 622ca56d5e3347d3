//! Fixed telnet option handshake performed before the console is shown
//!
//! The server asks the client to enable LINEMODE and announces that it will
//! ECHO, then waits until the client has answered both options in any form.
//! Replies are read as 3-byte `IAC <verb> <option>` chunks; anything that does
//! not look like an answer to one of the two options is skipped.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::{DO, DONT, IAC, OPT_ECHO, OPT_LINEMODE, WILL, WONT};

/// IAC DO LINEMODE, IAC WILL ECHO
pub const NEGOTIATION: [u8; 6] = [IAC, DO, OPT_LINEMODE, IAC, WILL, OPT_ECHO];

/// Default per-chunk read deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("I/O error during negotiation: {0}")]
    Io(#[from] io::Error),

    #[error("peer closed the connection during negotiation")]
    Closed,

    #[error("no negotiation reply within {0:?}")]
    Timeout(Duration),
}

/// Options answered by the peer so far
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Answered {
    echo: bool,
    linemode: bool,
}

impl Answered {
    fn observe(&mut self, chunk: [u8; 3]) {
        let [iac, verb, option] = chunk;
        if iac != IAC || !matches!(verb, DO | WILL | WONT | DONT) {
            return;
        }
        match option {
            OPT_ECHO => self.echo = true,
            OPT_LINEMODE => self.linemode = true,
            _ => {}
        }
    }

    fn complete(&self) -> bool {
        self.echo && self.linemode
    }
}

/// Run the handshake: write the command sequence once, then read 3-byte
/// chunks until both ECHO and LINEMODE have been answered.
///
/// The command write and every chunk read are bounded by `timeout`, re-armed
/// before each attempt. Any I/O error or deadline expiry aborts the handshake
/// without retry.
pub async fn negotiate<R, W>(
    reader: &mut R,
    writer: &mut W,
    timeout: Duration,
) -> Result<(), NegotiationError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let command = async {
        writer.write_all(&NEGOTIATION).await?;
        writer.flush().await
    };
    match tokio::time::timeout(timeout, command).await {
        Ok(result) => result?,
        Err(_) => return Err(NegotiationError::Timeout(timeout)),
    }

    let mut answered = Answered::default();
    let mut chunk = [0u8; 3];

    while !answered.complete() {
        match tokio::time::timeout(timeout, reader.read_exact(&mut chunk)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(NegotiationError::Closed);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(NegotiationError::Timeout(timeout)),
        }
        trace!("Negotiation chunk {:?}", chunk);
        answered.observe(chunk);
    }

    debug!("Telnet negotiation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split, DuplexStream};

    async fn run_server(server: DuplexStream, timeout: Duration) -> Result<(), NegotiationError> {
        let (mut rd, mut wr) = split(server);
        negotiate(&mut rd, &mut wr, timeout).await
    }

    #[test]
    fn test_observe_ignores_noise() {
        let mut answered = Answered::default();
        answered.observe([IAC, 250, OPT_ECHO]);
        answered.observe([0, DO, OPT_ECHO]);
        answered.observe([IAC, WILL, 24]);
        assert_eq!(answered, Answered::default());

        answered.observe([IAC, WONT, OPT_ECHO]);
        answered.observe([IAC, DONT, OPT_LINEMODE]);
        assert!(answered.complete());
    }

    #[tokio::test]
    async fn test_negotiation_succeeds_in_any_order() {
        let (mut client, server) = duplex(64);
        let server = tokio::spawn(run_server(server, DEFAULT_TIMEOUT));

        let mut sent = [0u8; 6];
        client.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent, NEGOTIATION);

        client.write_all(&[IAC, WILL, OPT_ECHO]).await.unwrap();
        client.write_all(&[IAC, DO, OPT_LINEMODE]).await.unwrap();

        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_negotiation_tolerates_interleaved_noise() {
        let (mut client, server) = duplex(64);
        let server = tokio::spawn(run_server(server, DEFAULT_TIMEOUT));

        client.write_all(&[IAC, WILL, 31]).await.unwrap();
        client.write_all(&[IAC, DONT, OPT_LINEMODE]).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        client.write_all(&[IAC, WONT, OPT_ECHO]).await.unwrap();

        server.await.unwrap().unwrap();

        // Exactly one command sequence is ever written
        let mut sent = Vec::new();
        client.read_to_end(&mut sent).await.unwrap();
        assert_eq!(sent, NEGOTIATION);
    }

    #[tokio::test]
    async fn test_negotiation_reassembles_split_chunks() {
        let (mut client, server) = duplex(64);
        let server = tokio::spawn(run_server(server, DEFAULT_TIMEOUT));

        client.write_all(&[IAC]).await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(&[WILL, OPT_ECHO, IAC]).await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(&[DO, OPT_LINEMODE]).await.unwrap();

        server.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_times_out_with_one_reply() {
        let (mut client, server) = duplex(64);
        let server = tokio::spawn(run_server(server, Duration::from_secs(10)));

        client.write_all(&[IAC, WILL, OPT_ECHO]).await.unwrap();

        let err = server.await.unwrap().unwrap_err();
        assert!(matches!(err, NegotiationError::Timeout(d) if d == Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_times_out_when_peer_never_reads() {
        // Too small for the command sequence
        let (client, server) = duplex(4);
        let server = tokio::spawn(run_server(server, Duration::from_secs(10)));

        let err = server.await.unwrap().unwrap_err();
        assert!(matches!(err, NegotiationError::Timeout(_)));
        drop(client);
    }

    #[tokio::test]
    async fn test_negotiation_fails_when_peer_closes() {
        let (mut client, server) = duplex(64);
        let server = tokio::spawn(run_server(server, DEFAULT_TIMEOUT));

        let mut sent = [0u8; 6];
        client.read_exact(&mut sent).await.unwrap();
        client.write_all(&[IAC, DO, OPT_LINEMODE]).await.unwrap();
        drop(client);

        let err = server.await.unwrap().unwrap_err();
        assert!(matches!(err, NegotiationError::Closed));
    }
}
