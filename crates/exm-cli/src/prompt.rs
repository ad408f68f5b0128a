//! Terminal credential prompts.
//!
//! Both secrets can be supplied through `EXM_VCC_API_KEY` and
//! `EXM_BEARER_TOKEN`; otherwise the user is prompted on stderr. The bearer
//! token is read in raw mode without echo when stdin is a terminal.

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode};

use exm_core::credentials::{CredentialError, CredentialGate};

pub const API_KEY_ENV: &str = "EXM_VCC_API_KEY";
pub const BEARER_TOKEN_ENV: &str = "EXM_BEARER_TOKEN";

/// Credential gate backed by the environment and the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalCredentialGate {
    prompted: bool,
}

impl TerminalCredentialGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the screen between two interactive prompts.
    fn clear_previous_prompt(&mut self) {
        if std::mem::replace(&mut self.prompted, true) {
            let mut stderr = io::stderr();
            if stderr.is_terminal() {
                let _ = execute!(stderr, Clear(ClearType::All), MoveTo(0, 0));
            }
        }
    }
}

impl CredentialGate for TerminalCredentialGate {
    fn acquire_api_key(&mut self) -> Result<String, CredentialError> {
        if let Some(value) = from_env(API_KEY_ENV) {
            tracing::debug!("VCC API key taken from {API_KEY_ENV}");
            return Ok(value);
        }
        self.clear_previous_prompt();
        prompt("Enter the VCC API key: ")?;
        read_line(&mut io::stdin().lock())
    }

    fn acquire_bearer_token(&mut self) -> Result<String, CredentialError> {
        if let Some(value) = from_env(BEARER_TOKEN_ENV) {
            tracing::debug!("bearer token taken from {BEARER_TOKEN_ENV}");
            return Ok(value);
        }
        self.clear_previous_prompt();
        prompt("Enter the OAuth 2.0 bearer token: ")?;

        if !io::stdin().is_terminal() {
            return read_line(&mut io::stdin().lock());
        }

        let token = {
            let _raw = RawModeGuard::enable()?;
            collect_masked(std::iter::from_fn(|| Some(event::read())))
        };
        // Raw mode swallowed the newline.
        eprintln!();
        token
    }
}

fn from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn prompt(text: &str) -> Result<(), CredentialError> {
    let mut stderr = io::stderr();
    stderr.write_all(text.as_bytes())?;
    stderr.flush()?;
    Ok(())
}

/// Read one line, without its terminator. End of input counts as cancelled.
fn read_line(reader: &mut impl BufRead) -> Result<String, CredentialError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(CredentialError::Cancelled);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

/// Build a secret from key events without echoing anything.
///
/// Enter submits, Backspace deletes, Esc or Ctrl-C cancels. Key releases and
/// non-key events are ignored.
pub fn collect_masked(
    events: impl IntoIterator<Item = io::Result<Event>>,
) -> Result<String, CredentialError> {
    let mut secret = String::new();
    for event in events {
        let Event::Key(key) = event? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Esc => return Err(CredentialError::Cancelled),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(CredentialError::Cancelled);
            }
            KeyCode::Char(c) => secret.push(c),
            KeyCode::Backspace => {
                secret.pop();
            }
            _ => {}
        }
    }
    Err(CredentialError::Cancelled)
}

/// Raw mode for the lifetime of the guard.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}
