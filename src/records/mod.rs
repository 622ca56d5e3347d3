//! Session records: one structured JSON line per finished session

mod write_buffer;

pub use write_buffer::{open_destination, start_record_writer, RecordSender, RecordWriter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::EndReason;

/// Everything captured during one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Time the session ended
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: u64,
    pub remote_ip: String,
    pub remote_port: u16,
    pub local_port: u16,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub negotiated: bool,
    pub end_reason: EndReason,
    /// Hex-encoded raw input, in arrival order
    pub input: String,
    pub input_len: usize,
    /// Time since the previous byte, one entry per input byte
    pub latencies_us: Vec<u64>,
    pub usernames: Vec<String>,
    pub passwords: Vec<String>,
    pub entries: Vec<String>,
}

impl SessionRecord {
    pub const KIND: &'static str = "session";

    pub fn input_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.input)
    }

    pub fn to_json_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}
