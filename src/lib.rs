//! Telnet honeypot - impersonates a network device's login console
//!
//! Negotiates a minimal telnet handshake, presents a login prompt that
//! rejects every credential, and records each session's keystrokes, timing
//! and captured credentials as one structured record.

pub mod config;
pub mod handlers;
pub mod records;
pub mod session;
pub mod telnet;
