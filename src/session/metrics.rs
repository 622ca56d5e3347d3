//! Per-session input metrics

use chrono::{DateTime, Utc};
use tokio::time::{Duration, Instant};

use super::{EndReason, SessionInfo};
use crate::records::SessionRecord;

/// Append-only accumulator for one session, turned into a [`SessionRecord`]
/// when the session ends.
#[derive(Debug)]
pub struct SessionMetrics {
    started_at: DateTime<Utc>,
    started: Instant,
    input: Vec<u8>,
    latencies: Vec<Duration>,
    usernames: Vec<String>,
    passwords: Vec<String>,
    entries: Vec<String>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            input: Vec::new(),
            latencies: Vec::new(),
            usernames: Vec::new(),
            passwords: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, byte: u8, latency: Duration) {
        self.input.push(byte);
        self.latencies.push(latency);
    }

    pub fn record_username(&mut self, username: String) {
        self.usernames.push(username);
    }

    pub fn record_password(&mut self, password: String) {
        self.passwords.push(password);
    }

    pub fn record_entry(&mut self, entry: String) {
        self.entries.push(entry);
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    pub fn latencies(&self) -> &[Duration] {
        &self.latencies
    }

    pub fn usernames(&self) -> &[String] {
        &self.usernames
    }

    pub fn passwords(&self) -> &[String] {
        &self.passwords
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn finalize(self, info: &SessionInfo, negotiated: bool, end_reason: EndReason) -> SessionRecord {
        let duration = self.started.elapsed();
        SessionRecord {
            timestamp: Utc::now(),
            kind: SessionRecord::KIND.to_string(),
            session_id: info.id,
            remote_ip: info.remote.ip().to_string(),
            remote_port: info.remote.port(),
            local_port: info.local_port,
            started_at: self.started_at,
            duration_ms: duration.as_millis() as u64,
            negotiated,
            end_reason,
            input_len: self.input.len(),
            input: hex::encode(&self.input),
            latencies_us: self.latencies.iter().map(|d| d.as_micros() as u64).collect(),
            usernames: self.usernames,
            passwords: self.passwords,
            entries: self.entries,
        }
    }
}
