//! Terminal I/O utilities for CLI.
//!
//! Provides TTY detection and the interactive console used for task
//! confirmations and prompts.

use std::io::{self, BufRead, IsTerminal, Write};

use invenio_deploy::utils::args::parse_bool;
use invenio_deploy::Console;

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

pub fn prompt(message: &str) -> invenio_deploy::Result<String> {
    eprint!("{}", message);
    io::stderr().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).map_err(|e| {
        invenio_deploy::Error::new(
            invenio_deploy::ErrorCode::InternalIoError,
            format!("Failed to read input: {}", e),
            serde_json::Value::Null,
        )
    })?;

    Ok(line.trim().to_string())
}

/// Asks on stderr and reads answers from stdin.
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn confirm(&self, message: &str, default: bool) -> invenio_deploy::Result<bool> {
        let choices = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let answer = prompt(&format!("{} {} ", message, choices))?;
            if answer.is_empty() {
                return Ok(default);
            }
            match parse_bool(&answer) {
                Some(value) => return Ok(value),
                None => eprintln!("I didn't understand you. Please specify '(y)es' or '(n)o'."),
            }
        }
    }

    fn prompt(&self, message: &str, default: &str) -> invenio_deploy::Result<String> {
        let answer = if default.is_empty() {
            prompt(&format!("{} ", message))?
        } else {
            prompt(&format!("{} [{}] ", message, default))?
        };
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }
}
