//! Operator confirmation before destructive steps

use std::io::{self, BufRead, Write};

use crate::error::{EngineError, EngineResult};

pub trait Confirmation {
    /// Ask a yes/no question; anything but an affirmative answer is "no"
    fn confirm(&self, prompt: &str) -> EngineResult<bool>;
}

/// Reads the answer from the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmation;

impl Confirmation for StdinConfirmation {
    fn confirm(&self, prompt: &str) -> EngineResult<bool> {
        print!("{} [y/N]: ", prompt);
        io::stdout()
            .flush()
            .map_err(|e| EngineError::Io(format!("Failed to write prompt: {}", e)))?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|e| EngineError::Io(format!("Failed to read answer: {}", e)))?;

        Ok(is_affirmative(&answer))
    }
}

/// Always gives the same answer (`--yes`, tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirmation for FixedAnswer {
    fn confirm(&self, _prompt: &str) -> EngineResult<bool> {
        Ok(self.0)
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("yep"));
    }
}
