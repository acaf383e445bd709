//! Terminal prompt and progress output.

use std::io::{self, BufRead, Write};

use practest_core::error::AttemptError;
use practest_core::model::{ExamModule, ResultPayload};
use practest_core::timer::format_clock;
use practest_core::traits::{AttemptObserver, ConfirmPrompt, Confirmation};

/// Asks `[y/N]` questions on stderr and reads the answer from stdin.
///
/// Anything other than `y` or `yes`, including end of input, is a no.
pub struct TerminalPrompt;

impl ConfirmPrompt for TerminalPrompt {
    fn confirm(&self, request: &Confirmation) -> bool {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "{} [y/N] ", request.message());
        let _ = stderr.flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&answer),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Console progress reporter.
///
/// Prints the clock on whole minutes and during the last ten seconds.
pub struct ConsoleObserver;

impl AttemptObserver for ConsoleObserver {
    fn on_transition(&self, module: ExamModule, from: &str, to: &str) {
        eprintln!("  [{module}] {from} -> {to}");
    }

    fn on_tick(&self, module: ExamModule, seconds_left: u32) {
        if seconds_left % 60 == 0 || seconds_left <= 10 {
            eprintln!("  [{module}] {} left", format_clock(seconds_left));
        }
    }

    fn on_error(&self, module: ExamModule, error: &AttemptError) {
        eprintln!("  ERROR [{module}]: {error}");
    }

    fn on_result(&self, payload: &ResultPayload) {
        eprintln!(
            "  [{}] attempt {} graded ({})",
            payload.module, payload.attempt_id, payload.meta.reason
        );
    }
}
