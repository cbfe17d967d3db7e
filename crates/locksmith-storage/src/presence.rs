//! Proof-of-presence checks run before gated credential store operations.
//!
//! Native biometric prompts are platform adapters of their own; the console gate
//! here is the terminal fallback. Every gate blocks the calling thread until the
//! user answers.

use std::io::{self, BufRead, IsTerminal, Write};

use locksmith_core::store::StoreError;
use tracing::debug;

pub trait PresenceGate: Send + Sync {
    /// Block until the user proves presence (`Ok`), declines (`AuthCanceled`),
    /// or the check cannot run (`AuthFailed`).
    fn verify(&self, prompt: &str) -> Result<(), StoreError>;
}

/// Asks for explicit confirmation on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleGate;

impl PresenceGate for ConsoleGate {
    fn verify(&self, prompt: &str) -> Result<(), StoreError> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Err(StoreError::AuthFailed {
                reason: "presence check needs an interactive terminal".to_string(),
            });
        }

        let mut stderr = io::stderr();
        write!(stderr, "{prompt}. Continue? [y/N]: ").map_err(auth_io)?;
        stderr.flush().map_err(auth_io)?;

        let mut answer = String::new();
        stdin.lock().read_line(&mut answer).map_err(auth_io)?;
        let outcome = parse_answer(&answer);
        debug!(approved = outcome.is_ok(), "console presence check finished");
        outcome
    }
}

fn parse_answer(answer: &str) -> Result<(), StoreError> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(StoreError::AuthCanceled),
    }
}

fn auth_io(err: io::Error) -> StoreError {
    StoreError::AuthFailed {
        reason: err.to_string(),
    }
}
