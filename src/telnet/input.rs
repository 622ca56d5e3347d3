//! Login prompt input machine
//!
//! Interprets post-negotiation keystrokes as line-oriented username/password
//! entry. The machine is pure: it never touches the socket and instead tells
//! the caller what to send back through [`Reply`].

use super::{ERASE, PASSWORD_PROMPT, REJECTION};

const NUL: u8 = 0;
const BS: u8 = 8;
const LF: u8 = 10;
const CR: u8 = 13;
const DEL: u8 = 127;

/// Longest line kept; further input is still recorded but not buffered or echoed
pub const MAX_LINE_LEN: usize = 256;

/// Which field the current line is being typed into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptState {
    #[default]
    Username,
    Password,
}

/// A completed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Username(String),
    Password { username: String, password: String },
}

impl LineEvent {
    /// `username:password` for a completed login attempt
    pub fn entry(&self) -> Option<String> {
        match self {
            LineEvent::Username(_) => None,
            LineEvent::Password { username, password } => Some(format!("{}:{}", username, password)),
        }
    }
}

/// Bytes the server owes the peer after a keystroke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Echo(u8),
    Erase,
    PasswordPrompt,
    Rejection,
}

impl Reply {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Reply::Echo(byte) => std::slice::from_ref(byte),
            Reply::Erase => ERASE,
            Reply::PasswordPrompt => PASSWORD_PROMPT,
            Reply::Rejection => REJECTION,
        }
    }

    /// Echo and erase writes are best-effort; prompt writes are not.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, Reply::Echo(_) | Reply::Erase)
    }
}

/// Outcome of feeding one byte
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Step {
    pub reply: Option<Reply>,
    pub event: Option<LineEvent>,
}

enum ByteClass {
    Erase,
    Terminate,
    Ignore,
    Input(u8),
}

fn classify(byte: u8) -> ByteClass {
    match byte {
        DEL | BS => ByteClass::Erase,
        NUL | LF => ByteClass::Terminate,
        CR => ByteClass::Ignore,
        other => ByteClass::Input(other),
    }
}

#[derive(Debug, Default)]
pub struct InputMachine {
    state: PromptState,
    line: Vec<u8>,
    username: String,
}

impl InputMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PromptState {
        self.state
    }

    /// The not yet submitted line
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    pub fn feed(&mut self, byte: u8) -> Step {
        match classify(byte) {
            ByteClass::Erase => {
                // Nothing typed, nothing to erase
                if self.line.pop().is_none() {
                    return Step::default();
                }
                let reply = match self.state {
                    PromptState::Username => Some(Reply::Erase),
                    PromptState::Password => None,
                };
                Step { reply, event: None }
            }
            ByteClass::Terminate => self.newline(),
            ByteClass::Ignore => Step::default(),
            ByteClass::Input(_) if self.line.len() >= MAX_LINE_LEN => Step::default(),
            ByteClass::Input(byte) => {
                self.line.push(byte);
                let reply = match self.state {
                    PromptState::Username => Some(Reply::Echo(byte)),
                    PromptState::Password => None,
                };
                Step { reply, event: None }
            }
        }
    }

    fn newline(&mut self) -> Step {
        let text = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();

        match self.state {
            PromptState::Username => {
                self.username = text.clone();
                self.state = PromptState::Password;
                Step {
                    reply: Some(Reply::PasswordPrompt),
                    event: Some(LineEvent::Username(text)),
                }
            }
            PromptState::Password => {
                let username = std::mem::take(&mut self.username);
                self.state = PromptState::Username;
                Step {
                    reply: Some(Reply::Rejection),
                    event: Some(LineEvent::Password { username, password: text }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(machine: &mut InputMachine, input: &[u8]) -> Vec<Step> {
        input.iter().map(|&b| machine.feed(b)).collect()
    }

    #[test]
    fn test_username_is_echoed_and_captured() {
        let mut machine = InputMachine::new();
        let steps = feed_all(&mut machine, b"root");
        let echoed: Vec<u8> = steps
            .iter()
            .filter_map(|s| s.reply)
            .flat_map(|r| r.bytes().to_vec())
            .collect();
        assert_eq!(echoed, b"root");
        assert_eq!(machine.line(), b"root");

        let step = machine.feed(b'\n');
        assert_eq!(step.reply, Some(Reply::PasswordPrompt));
        assert_eq!(step.event, Some(LineEvent::Username("root".to_string())));
        assert!(machine.line().is_empty());
        assert_eq!(machine.state(), PromptState::Password);
    }

    #[test]
    fn test_password_is_not_echoed_and_always_rejected() {
        let mut machine = InputMachine::new();
        feed_all(&mut machine, b"admin\n");

        let steps = feed_all(&mut machine, b"admin");
        assert!(steps.iter().all(|s| s.reply.is_none() && s.event.is_none()));

        let step = machine.feed(b'\n');
        assert_eq!(step.reply, Some(Reply::Rejection));
        let event = step.event.unwrap();
        assert_eq!(event.entry().as_deref(), Some("admin:admin"));
        assert_eq!(machine.state(), PromptState::Username);
        assert!(machine.line().is_empty());
    }

    #[test]
    fn test_nul_terminates_like_lf() {
        let mut machine = InputMachine::new();
        let step = machine.feed(NUL);
        assert_eq!(step.event, Some(LineEvent::Username(String::new())));
        assert_eq!(machine.state(), PromptState::Password);

        let step = machine.feed(NUL);
        assert_eq!(
            step.event,
            Some(LineEvent::Password {
                username: String::new(),
                password: String::new(),
            })
        );
    }

    #[test]
    fn test_cr_is_swallowed() {
        let mut machine = InputMachine::new();
        feed_all(&mut machine, b"ab");
        assert_eq!(machine.feed(CR), Step::default());
        assert_eq!(machine.line(), b"ab");
        assert_eq!(machine.state(), PromptState::Username);
    }

    #[test]
    fn test_erase_on_empty_line_is_noop() {
        let mut machine = InputMachine::new();
        assert_eq!(machine.feed(BS), Step::default());
        assert_eq!(machine.feed(DEL), Step::default());
        assert!(machine.line().is_empty());
    }

    #[test]
    fn test_erase_in_username_sends_erase_sequence() {
        let mut machine = InputMachine::new();
        feed_all(&mut machine, b"roox");
        let step = machine.feed(DEL);
        assert_eq!(step.reply, Some(Reply::Erase));
        assert_eq!(step.reply.unwrap().bytes(), b"\x08 \x08");
        feed_all(&mut machine, b"t");

        let step = machine.feed(LF);
        assert_eq!(step.event, Some(LineEvent::Username("root".to_string())));
    }

    #[test]
    fn test_erase_in_password_is_silent() {
        let mut machine = InputMachine::new();
        feed_all(&mut machine, b"u\n");
        feed_all(&mut machine, b"pw1");
        let step = machine.feed(BS);
        assert_eq!(step, Step::default());
        assert_eq!(machine.line(), b"pw");
    }

    #[test]
    fn test_loops_back_to_username_prompt() {
        let mut machine = InputMachine::new();
        let events: Vec<LineEvent> = feed_all(&mut machine, b"root\ntoor\nadmin\r\n1234\r\n")
            .into_iter()
            .filter_map(|s| s.event)
            .collect();
        let entries: Vec<String> = events.iter().filter_map(LineEvent::entry).collect();
        assert_eq!(entries, vec!["root:toor", "admin:1234"]);
        assert_eq!(machine.state(), PromptState::Username);
    }

    #[test]
    fn test_line_is_capped() {
        let mut machine = InputMachine::new();
        let steps = feed_all(&mut machine, &[b'a'; MAX_LINE_LEN + 10]);
        assert_eq!(machine.line().len(), MAX_LINE_LEN);
        assert!(steps[..MAX_LINE_LEN].iter().all(|s| s.reply == Some(Reply::Echo(b'a'))));
        assert!(steps[MAX_LINE_LEN..].iter().all(|s| *s == Step::default()));

        // Editing still works at the cap, and the line ends normally
        assert_eq!(machine.feed(BS).reply, Some(Reply::Erase));
        assert_eq!(machine.feed(b'b').reply, Some(Reply::Echo(b'b')));
        let step = machine.feed(LF);
        let expected = format!("{}b", "a".repeat(MAX_LINE_LEN - 1));
        assert_eq!(step.event, Some(LineEvent::Username(expected)));
        assert!(machine.line().is_empty());
    }

    #[test]
    fn test_reply_best_effort_classes() {
        assert!(Reply::Echo(b'a').is_best_effort());
        assert!(Reply::Erase.is_best_effort());
        assert!(!Reply::PasswordPrompt.is_best_effort());
        assert!(!Reply::Rejection.is_best_effort());
    }
}
