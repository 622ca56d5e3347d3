//! Session state for one accepted connection

mod metrics;

pub use metrics::SessionMetrics;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::records::RecordSender;
use crate::telnet::input::{InputMachine, LineEvent, PromptState, Step};

/// Process-wide session identifier source, starting at 1
#[derive(Debug)]
pub struct SessionCounter(AtomicU64);

impl Default for SessionCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Addressing for a session, fixed at accept time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u64,
    pub remote: SocketAddr,
    pub local_port: u16,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    NegotiationFailed,
    IdleTimeout,
    Disconnected,
    ReadError,
    WriteFailed,
    Shutdown,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::NegotiationFailed => "negotiation_failed",
            EndReason::IdleTimeout => "idle_timeout",
            EndReason::Disconnected => "disconnected",
            EndReason::ReadError => "read_error",
            EndReason::WriteFailed => "write_failed",
            EndReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One connection's lifetime: prompt state, metrics and the record it owes.
///
/// Dropping a session finalizes its metrics and queues exactly one
/// [`SessionRecord`](crate::records::SessionRecord), whichever path ended it.
#[derive(Debug)]
pub struct Session {
    info: SessionInfo,
    machine: InputMachine,
    metrics: SessionMetrics,
    last_input: Instant,
    negotiated: bool,
    end_reason: EndReason,
    records: RecordSender,
}

impl Session {
    pub fn new(info: SessionInfo, records: RecordSender) -> Self {
        Self {
            info,
            machine: InputMachine::new(),
            metrics: SessionMetrics::new(),
            last_input: Instant::now(),
            negotiated: false,
            end_reason: EndReason::Disconnected,
            records,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn id(&self) -> u64 {
        self.info.id
    }

    pub fn prompt_state(&self) -> PromptState {
        self.machine.state()
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Negotiation finished and the banner went out at `at`; keystroke
    /// latencies are measured from here on.
    pub fn mark_negotiated(&mut self, at: Instant) {
        self.negotiated = true;
        self.last_input = at;
    }

    /// Record one received byte, then run it through the prompt machine.
    pub fn feed(&mut self, byte: u8, at: Instant) -> Step {
        let latency = at.saturating_duration_since(self.last_input);
        self.last_input = at;
        self.metrics.record(byte, latency);

        let step = self.machine.feed(byte);
        if let Some(event) = &step.event {
            match event {
                LineEvent::Username(username) => {
                    self.metrics.record_username(username.clone());
                }
                LineEvent::Password { password, .. } => {
                    self.metrics.record_password(password.clone());
                    if let Some(entry) = event.entry() {
                        info!(session_id = self.info.id, "Login attempt {}", entry);
                        self.metrics.record_entry(entry);
                    }
                }
            }
        }
        step
    }

    pub fn close(&mut self, reason: EndReason) {
        self.end_reason = reason;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let metrics = std::mem::take(&mut self.metrics);
        let record = metrics.finalize(&self.info, self.negotiated, self.end_reason);

        info!(
            session_id = record.session_id,
            remote_addr = %self.info.remote,
            local_port = record.local_port,
            end_reason = %record.end_reason,
            duration_ms = record.duration_ms,
            input_len = record.input_len,
            entries = record.entries.len(),
            "Session closed"
        );

        if self.records.send(record).is_err() {
            warn!(session_id = self.info.id, "Record writer gone, session record dropped");
        }
    }
}
