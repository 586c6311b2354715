//! Structured JSON logger
//!
//! One log line = one event. Logs are synchronous and unbuffered, keys are
//! emitted in deterministic order (event, severity, then fields sorted
//! alphabetically), so log output is stable across runs.

use std::fmt;
use std::io::{self, Write};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace,
    /// Normal operations
    Info,
    /// Recoverable issues
    Warn,
    /// Operation failures
    Error,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Synchronous structured logger
pub struct Logger;

impl Logger {
    /// Logs an event with the given severity and fields to stdout.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let line = Self::render(severity, event, fields);
        let _ = writeln!(io::stdout(), "{}", line);
    }

    /// Renders one event as a JSON line.
    fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(128);
        output.push_str("{\"event\":\"");
        escape_into(&mut output, event);
        output.push_str("\",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push('"');

        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);
        for (key, value) in sorted {
            output.push_str(",\"");
            escape_into(&mut output, key);
            output.push_str("\":\"");
            escape_into(&mut output, value);
            output.push('"');
        }
        output.push('}');
        output
    }
}

fn escape_into(output: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if (c as u32) < 0x20 => output.push_str(&format!("\\u{:04x}", c as u32)),
            c => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_field_order() {
        let line = Logger::render(
            Severity::Info,
            "insert",
            &[("table", "users"), ("id", "abc")],
        );
        assert_eq!(
            line,
            "{\"event\":\"insert\",\"severity\":\"INFO\",\"id\":\"abc\",\"table\":\"users\"}"
        );
    }

    #[test]
    fn test_escaping() {
        let line = Logger::render(Severity::Error, "fail", &[("msg", "a \"quoted\"\nline")]);
        assert!(line.contains("a \\\"quoted\\\"\\nline"));
    }

    #[test]
    fn test_line_is_valid_json() {
        let line = Logger::render(Severity::Warn, "rollback", &[("reason", "tab\tstop")]);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["severity"], "WARN");
    }
}
