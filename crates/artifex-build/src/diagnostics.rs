//! Parsing of bundler log output into structured diagnostics.
//!
//! The bundler prints blocks of the form
//!
//! ```text
//! ✘ [ERROR] Could not resolve "left-pad"
//!
//!     <stdin>:1:16:
//!       1 │ import pad from "left-pad";
//!         ╵                 ~~~~~~~~~~
//! ```
//!
//! Only the headline and the first location line of each block are kept.

use std::sync::LazyLock;

use artifex_core::{BuildLocation, BuildMessage};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Error,
    Warning,
}

static HEADLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[✘▲X!]\s*)?\[(ERROR|WARNING)\]\s*(.*)$")
        .unwrap_or_else(|e| panic!("invalid diagnostic headline pattern: {e}"))
});

static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(\S.*?):(\d+):(\d+):\s*$")
        .unwrap_or_else(|e| panic!("invalid diagnostic location pattern: {e}"))
});

static PLAIN_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*error:\s*(.+)$").unwrap_or_else(|e| panic!("invalid plain error pattern: {e}"))
});

/// Split bundler stderr into `(errors, warnings)`.
pub fn parse_diagnostics(stderr: &str) -> (Vec<BuildMessage>, Vec<BuildMessage>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut current: Option<(Severity, BuildMessage)> = None;

    let mut flush = |entry: Option<(Severity, BuildMessage)>| match entry {
        Some((Severity::Error, msg)) => errors.push(msg),
        Some((Severity::Warning, msg)) => warnings.push(msg),
        None => {}
    };

    for line in stderr.lines() {
        if let Some(caps) = HEADLINE.captures(line) {
            flush(current.take());
            let severity = if &caps[1] == "ERROR" {
                Severity::Error
            } else {
                Severity::Warning
            };
            current = Some((severity, BuildMessage::new(caps[2].trim())));
            continue;
        }
        if let Some((_, msg)) = current.as_mut() {
            if msg.location.is_none() {
                if let Some(caps) = LOCATION.captures(line) {
                    msg.location = Some(BuildLocation {
                        file: caps[1].to_string(),
                        line: caps[2].parse().unwrap_or(0),
                        column: caps[3].parse().unwrap_or(0),
                    });
                }
            }
            continue;
        }
        if let Some(caps) = PLAIN_ERROR.captures(line) {
            flush(Some((Severity::Error, BuildMessage::new(caps[1].trim()))));
        }
    }
    flush(current.take());
    (errors, warnings)
}

/// Summary line such as "1 error, 2 warnings".
pub fn summarize(errors: &[BuildMessage], warnings: &[BuildMessage]) -> String {
    let plural = |n: usize, word: &str| {
        if n == 1 {
            format!("{n} {word}")
        } else {
            format!("{n} {word}s")
        }
    };
    format!("{}, {}", plural(errors.len(), "error"), plural(warnings.len(), "warning"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"✘ [ERROR] Could not resolve "left-pad"

    <stdin>:1:16:
      1 │ import pad from "left-pad";
        ╵                 ~~~~~~~~~~

  You can mark the path "left-pad" as external to exclude it from the bundle.

▲ [WARNING] Comparison with -0 using the "===" operator will also match 0 [equals-negative-zero]

    <stdin>:3:6:
      3 │ if (x === -0) {}
        ╵       ~~~

1 warning and 1 error
"#;

    #[test]
    fn test_parses_errors_and_warnings_with_locations() {
        let (errors, warnings) = parse_diagnostics(SAMPLE);
        assert_eq!(errors.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(errors[0].text, "Could not resolve \"left-pad\"");
        let loc = errors[0].location.as_ref().unwrap();
        assert_eq!((loc.file.as_str(), loc.line, loc.column), ("<stdin>", 1, 16));
        assert_eq!(warnings[0].location.as_ref().unwrap().line, 3);
    }

    #[test]
    fn test_plain_error_line() {
        let (errors, warnings) = parse_diagnostics("error: Invalid target \"es1999\"\n");
        assert_eq!(errors, vec![BuildMessage::new("Invalid target \"es1999\"")]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_empty_output() {
        let (errors, warnings) = parse_diagnostics("");
        assert!(errors.is_empty() && warnings.is_empty());
    }

    #[test]
    fn test_summary() {
        let (errors, warnings) = parse_diagnostics(SAMPLE);
        assert_eq!(summarize(&errors, &warnings), "1 error, 1 warning");
    }
}
