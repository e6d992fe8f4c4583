//! Interactive session
//!
//! One Engine lives for the whole session, so the cache and the follow-up
//! context carry over between questions.

use crate::logging::TurnLogEntry;
use crate::output;
use guru_common::engine::Engine;
use std::io::{self, BufRead, Write};
use std::time::Instant;

pub const PROMPT: &str = "Ask Tennis Guru (or type 'exit'): ";

const EXIT_WORDS: &[&str] = &["exit", "quit", "q"];

pub fn is_exit_command(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    EXIT_WORDS.contains(&lower.as_str())
}

/// Read questions until EOF or an exit word. Returns the number of turns.
pub fn run_repl<R: BufRead, W: Write>(
    engine: &mut Engine,
    input: R,
    out: &mut W,
    log_turns: bool,
) -> io::Result<usize> {
    let mut turns = 0;
    let mut lines = input.lines();

    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let line = line?;
        let question = line.trim();

        if question.is_empty() {
            continue;
        }
        if is_exit_command(question) {
            writeln!(out, "Bye!")?;
            break;
        }

        let started = Instant::now();
        let res = engine.process(question);
        turns += 1;

        if log_turns {
            TurnLogEntry::from_result(&res, started.elapsed()).write();
        }

        writeln!(out, "\n{}", output::render(&res))?;
    }

    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_words() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  QUIT "));
        assert!(is_exit_command("q"));
        assert!(!is_exit_command("quiet"));
        assert!(!is_exit_command("which tournament?"));
    }
}
