//! Compiler output parsing
//!
//! Turns raw compiler output into line-tagged diagnostics without filtering
//! or reordering what the compiler said.

use regex::Regex;

use crate::config::ConfigError;
use crate::types::Diagnostic;

/// Compiled form of a toolchain's `diagnostic_pattern`
#[derive(Debug, Clone)]
pub struct DiagnosticParser {
    located: Regex,
    unlocated: Regex,
    summary: Regex,
}

impl DiagnosticParser {
    /// Compile a diagnostic pattern. It must have a `message` group and may
    /// have a `line` group.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let located = Regex::new(pattern).map_err(|e| ConfigError::DiagnosticPattern {
            pattern: pattern.to_owned(),
            message: e.to_string(),
        })?;
        if !located.capture_names().flatten().any(|name| name == "message") {
            return Err(ConfigError::DiagnosticPattern {
                pattern: pattern.to_owned(),
                message: "missing a 'message' capture group".to_owned(),
            });
        }

        Ok(Self {
            located,
            unlocated: Regex::new(r"^(?:error|warning|Note): (?P<message>.*)$")
                .expect("static pattern"),
            summary: Regex::new(r"^\d+ (?:errors?|warnings?)$").expect("static pattern"),
        })
    }

    /// Split compiler output into diagnostics, in emission order.
    ///
    /// A located header starts a diagnostic with its line number; an
    /// unlocated `error:`/`warning:`/`Note:` line starts one with no line.
    /// Other lines continue the current diagnostic, or stand alone with no
    /// line if nothing has started yet. The trailing count summary is not a
    /// diagnostic and is dropped.
    pub fn parse(&self, output: &str) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        for raw in output.lines() {
            let line = raw.trim_end();
            if line.trim().is_empty() || self.summary.is_match(line) {
                continue;
            }

            if let Some(caps) = self.located.captures(line) {
                let number = caps.name("line").and_then(|m| m.as_str().parse().ok());
                let message = caps.name("message").map_or(line, |m| m.as_str());
                diagnostics.push(Diagnostic::new(number, message));
            } else if let Some(caps) = self.unlocated.captures(line) {
                let message = caps.name("message").map_or(line, |m| m.as_str());
                diagnostics.push(Diagnostic::new(None, message));
            } else if let Some(current) = diagnostics.last_mut() {
                current.message.push('\n');
                current.message.push_str(line);
            } else {
                diagnostics.push(Diagnostic::new(None, line));
            }
        }

        diagnostics
    }
}
