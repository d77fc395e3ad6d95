//! Operator confirmation and prompting.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::utils::args::parse_bool;

pub trait Console {
    /// Ask a yes/no question.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    /// Ask for a value; an empty answer yields `default`.
    fn prompt(&self, message: &str, default: &str) -> Result<String>;
}

/// Answers yes to every confirmation and takes every prompt default (`--yes`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Console for AssumeYes {
    fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
        log_status!("confirm", "{} [assumed yes]", message);
        Ok(true)
    }

    fn prompt(&self, message: &str, default: &str) -> Result<String> {
        log_status!("prompt", "{} [using default]", message);
        Ok(default.to_string())
    }
}

/// Refuses to ask anything; used when no terminal is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConsole;

impl NoConsole {
    fn refuse(message: &str) -> Error {
        Error::validation_invalid_argument(
            "tty",
            format!("Confirmation required but no terminal is attached: {}", message),
            None,
            None,
        )
        .with_hint("Re-run with --yes to accept every confirmation")
    }
}

impl Console for NoConsole {
    fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
        Err(Self::refuse(message))
    }

    fn prompt(&self, message: &str, _default: &str) -> Result<String> {
        Err(Self::refuse(message))
    }
}

/// Answers questions from a fixed script; once exhausted, defaults are used.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedConsole {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Questions asked so far, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    fn next_answer(&self, message: &str) -> Option<String> {
        self.asked.borrow_mut().push(message.to_string());
        self.answers.borrow_mut().pop_front()
    }
}

impl Console for ScriptedConsole {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        match self.next_answer(message) {
            Some(answer) if answer.trim().is_empty() => Ok(default),
            Some(answer) => parse_bool(&answer).ok_or_else(|| {
                Error::validation_invalid_argument(
                    "confirm",
                    format!("Not a yes/no answer: {}", answer),
                    None,
                    None,
                )
            }),
            None => Ok(default),
        }
    }

    fn prompt(&self, message: &str, default: &str) -> Result<String> {
        match self.next_answer(message) {
            Some(answer) if !answer.is_empty() => Ok(answer),
            _ => Ok(default.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_answers_then_defaults() {
        let console = ScriptedConsole::new(["n", "yes", ""]);
        assert!(!console.confirm("Stash?", true).unwrap());
        assert!(console.confirm("Reset?", false).unwrap());
        assert!(console.confirm("Again?", true).unwrap());
        assert!(!console.confirm("Exhausted?", false).unwrap());
        assert_eq!(console.asked().len(), 4);
    }

    #[test]
    fn scripted_prompt_defaults_on_empty() {
        let console = ScriptedConsole::new(["", "s3cret"]);
        assert_eq!(console.prompt("Password", "my123p$ss").unwrap(), "my123p$ss");
        assert_eq!(console.prompt("Password", "my123p$ss").unwrap(), "s3cret");
    }

    #[test]
    fn no_console_refuses() {
        let err = NoConsole.confirm("Remove?", false).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
        assert!(AssumeYes.confirm("Remove?", false).unwrap());
    }
}
