//! Telnet protocol pieces: the fixed option handshake and the login input machine

pub mod input;
pub mod negotiate;

pub use input::{InputMachine, LineEvent, PromptState, Reply};
pub use negotiate::{negotiate, NegotiationError};

// Telnet command bytes
pub const IAC: u8 = 255; // Interpret As Command
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;

// Telnet options
pub const OPT_ECHO: u8 = 1;
pub const OPT_LINEMODE: u8 = 34;

/// Banner sent once negotiation completes
pub const BANNER: &[u8] = b"\nUser Access Verification\r\nUsername:";
pub const PASSWORD_PROMPT: &[u8] = b"\r\nPassword: ";
pub const REJECTION: &[u8] = b"\r\nWrong password!\r\n\r\nUsername: ";
/// Erases the last echoed character on the peer's terminal
pub const ERASE: &[u8] = b"\x08 \x08";
