//! Operator confirmation.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

pub trait Confirm {
    /// Ask a yes/no question. When `skip` is true the default answer is
    /// returned without asking.
    fn confirm(&self, message: &str, default_answer: bool, skip: bool) -> bool;
}

/// Interpret a typed answer. An empty line selects the default.
pub fn parse_answer(input: &str, default_answer: bool) -> bool {
    match input.trim().to_lowercase().as_str() {
        "" => default_answer,
        "y" | "yes" => true,
        _ => false,
    }
}

fn suffix(default_answer: bool) -> &'static str {
    if default_answer { "[Y/n]: " } else { "[y/N]: " }
}

/// Reads answers from standard input.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, message: &str, default_answer: bool, skip: bool) -> bool {
        if skip {
            return default_answer;
        }

        let mut stdout = io::stdout();
        let _ = write!(stdout, "{} {}", message, suffix(default_answer));
        let _ = stdout.flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => {
                tracing::warn!("No answer on stdin, using default {}", default_answer);
                default_answer
            }
            Ok(_) => parse_answer(&line, default_answer),
        }
    }
}

/// Replays queued answers; falls back to the default once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions that were actually put to the operator.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Confirm for ScriptedPrompt {
    fn confirm(&self, message: &str, default_answer: bool, skip: bool) -> bool {
        if skip {
            return default_answer;
        }
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(message.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(default_answer)
    }
}

impl<C: Confirm + ?Sized> Confirm for &C {
    fn confirm(&self, message: &str, default_answer: bool, skip: bool) -> bool {
        (**self).confirm(message, default_answer, skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers() {
        assert!(parse_answer("Y\n", false));
        assert!(parse_answer(" yes ", false));
        assert!(!parse_answer("nope", true));
        assert!(parse_answer("\n", true));
        assert!(!parse_answer("", false));
    }

    #[test]
    fn skip_returns_default_without_consuming() {
        let prompt = ScriptedPrompt::new([false]);
        assert!(prompt.confirm("Reboot?", true, true));
        assert!(prompt.asked().is_empty());
        assert!(!prompt.confirm("Reboot?", true, false));
        assert_eq!(prompt.asked(), ["Reboot?"]);
    }
}
