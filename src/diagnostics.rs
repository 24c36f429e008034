//! Diagnostic reporting for the Adder compiler.
//!
//! Lightweight rustc-style error output: a red "error:" header, the file
//! path when known, and a few lines of source context. The semantic pass and
//! the emitter never print; the driver funnels their errors through here.

use std::fmt;

/// An emitter-side failure. These signal compiler bugs (broken invariants,
/// LLVM builder failures), not user errors.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
}

impl Diagnostic {
    pub fn simple(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Print a compact diagnostic to stderr.
pub fn report_error(file: Option<&str>, source: Option<&str>, message: &str, note: Option<&str>) {
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    eprintln!("{}error{}: {}", red, reset, message);
    if let Some(path) = file {
        eprintln!("  --> {}", path);
    }

    // If the message names a line, show it with a little context.
    if let Some(src) = source {
        if let Some(lineno) = line_of(message) {
            let lines: Vec<&str> = src.lines().collect();
            let idx = lineno.saturating_sub(1);
            let start = idx.saturating_sub(1);
            let end = (idx + 1).min(lines.len().saturating_sub(1));
            for (i, line) in lines.iter().enumerate().take(end + 1).skip(start) {
                eprintln!("{:4} | {}", i + 1, line);
            }
        }
    }

    if let Some(note) = note {
        let blue = "\x1b[34m";
        eprintln!("{}note{}: {}", blue, reset, note);
    }
}

/// Convenience that prints an error then returns an `anyhow::Error` so
/// callers can terminate via `?`.
pub fn report_error_and_bail<T>(
    file: Option<&str>,
    source: Option<&str>,
    message: &str,
    note: Option<&str>,
) -> anyhow::Result<T> {
    report_error(file, source, message, note);
    Err(anyhow::anyhow!("{}", message))
}

/// Extract a `line N` reference from an error message, if present.
fn line_of(message: &str) -> Option<usize> {
    let rest = message.split("line ").nth(1)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
