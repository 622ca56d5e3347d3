//! Write buffer for session records
//!
//! Sessions queue their record on a channel as they end; a single background
//! task owns the destination and writes the records as JSON lines in batches.

use std::io;
use std::path::Path;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::SessionRecord;

/// Sender handle for queueing records
pub type RecordSender = mpsc::UnboundedSender<SessionRecord>;

/// Destination the writer task owns
pub type RecordWriter = Box<dyn AsyncWrite + Send + Unpin>;

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL_MS: u64 = 250;

/// Open the record destination: append to `file`, or stdout when unset
pub async fn open_destination(file: Option<&Path>) -> io::Result<RecordWriter> {
    match file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path).await?;
            info!("Session records written to {}", path.display());
            Ok(Box::new(file))
        }
        None => {
            info!("Session records written to stdout");
            Ok(Box::new(tokio::io::stdout()))
        }
    }
}

/// Start the record writer task.
///
/// The task exits after every sender has been dropped and the remaining
/// records are written; await the handle to drain on shutdown.
pub fn start_record_writer<W>(writer: W) -> (RecordSender, JoinHandle<()>)
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(write_buffer_task(writer, rx));
    (tx, handle)
}

/// Background task that collects records and writes them in batches
async fn write_buffer_task<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<SessionRecord>)
where
    W: AsyncWrite + Unpin,
{
    let mut buffer: Vec<SessionRecord> = Vec::with_capacity(BATCH_SIZE);
    let mut flush_interval = tokio::time::interval(tokio::time::Duration::from_millis(FLUSH_INTERVAL_MS));

    debug!("Record writer started (batch_size={}, flush_interval={}ms)", BATCH_SIZE, FLUSH_INTERVAL_MS);

    loop {
        tokio::select! {
            record = rx.recv() => {
                match record {
                    Some(r) => {
                        buffer.push(r);
                        if buffer.len() >= BATCH_SIZE {
                            flush_batch(&mut writer, &mut buffer).await;
                        }
                    }
                    None => {
                        // Channel closed, flush remaining and exit
                        if !buffer.is_empty() {
                            flush_batch(&mut writer, &mut buffer).await;
                        }
                        debug!("Record writer shutting down");
                        break;
                    }
                }
            }
            _ = flush_interval.tick() => {
                if !buffer.is_empty() {
                    flush_batch(&mut writer, &mut buffer).await;
                }
            }
        }
    }
}

/// Write buffered records, one JSON line each
async fn flush_batch<W>(writer: &mut W, buffer: &mut Vec<SessionRecord>)
where
    W: AsyncWrite + Unpin,
{
    let count = buffer.len();
    debug!("Flushing {} session records", count);

    let mut out = Vec::new();
    for record in buffer.drain(..) {
        match record.to_json_line() {
            Ok(line) => out.extend_from_slice(&line),
            Err(e) => error!(session_id = record.session_id, "Failed to serialize session record: {}", e),
        }
    }

    // Records are lost on failure
    if let Err(e) = writer.write_all(&out).await {
        error!("Failed to write {} session records: {}", count, e);
        return;
    }
    if let Err(e) = writer.flush().await {
        error!("Failed to flush session records: {}", e);
    }
}
