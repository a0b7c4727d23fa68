//! Interactive confirmation
//!
//! Every "are you sure?" gate goes through [`Prompt`] so runs can be driven
//! non-interactively (`--force`) and tested.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

/// Asks the user a yes/no question
pub trait Prompt: Send + Sync {
    fn confirm(&self, question: &str) -> io::Result<bool>;
}

/// Reads the answer from stdin; anything but `y`/`yes` is a no
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "{} (y/n): ", question)?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

/// Answers every question the same way and remembers what was asked
#[derive(Debug, Default)]
pub struct AutoPrompt {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl AutoPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far
    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .map(|asked| asked.clone())
            .unwrap_or_default()
    }
}

impl Prompt for AutoPrompt {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
        Ok(self.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_prompt_records_questions() {
        let prompt = AutoPrompt::new(false);
        assert!(!prompt.confirm("Continue?").unwrap());
        assert_eq!(prompt.asked(), vec!["Continue?"]);
    }
}
