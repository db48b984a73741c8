//! Static pre-execution screening
//!
//! Rejects source text containing known-dangerous constructs before any
//! compiler or process is involved. This is a best-effort denylist: string
//! concatenation, reflection synonyms or escape sequences get around it. It
//! is advisory and not an isolation boundary.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Drive-letter path literal passed to a file-opening constructor
const ABSOLUTE_FILE_PATH: &str = r#"\bnew\s+(?:File|FileReader|FileWriter)\s*\(\s*"[A-Za-z]:\\"#;

/// Two-character parent-directory token
const PARENT_DIRECTORY: &str = "..";

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("invalid screen pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("empty literal at position {0} in screen literals")]
    EmptyLiteral(usize),
}

/// Blocklist as written in configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Case-sensitive substrings, matched against whitespace-normalized text
    #[serde(default)]
    pub literals: Vec<String>,

    /// Regular expressions, matched against the raw text
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
}

/// A pattern rule with an optional human-readable description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,

    /// Shown as the rejection reason. Defaults to the pattern itself.
    #[serde(default)]
    pub description: Option<String>,
}

impl PatternRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Text reported when this rule rejects a snippet
    pub fn reason(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.pattern)
    }
}

/// Why a snippet was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A literal rule matched; carries the literal
    Literal(String),

    /// A pattern rule matched; carries the rule's description
    Pattern(String),

    /// A drive-letter path was passed to a file-opening call
    AbsoluteFilePath,

    /// The source contains the parent-directory token
    ParentDirectory,
}

impl Rejection {
    /// The violated rule, without the surrounding message
    pub fn rule(&self) -> &str {
        match self {
            Rejection::Literal(rule) | Rejection::Pattern(rule) => rule,
            Rejection::AbsoluteFilePath => "absolute file path",
            Rejection::ParentDirectory => PARENT_DIRECTORY,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Literal(literal) => write!(f, "Dangerous code detected! ({literal})"),
            Rejection::Pattern(description) => {
                write!(f, "Dangerous pattern blocked: {description}")
            }
            Rejection::AbsoluteFilePath => f.write_str("Absolute file path usage blocked."),
            Rejection::ParentDirectory => {
                f.write_str("Parent directory access ('..') is blocked.")
            }
        }
    }
}

/// Result of screening one snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Reject(Rejection),
}

impl Verdict {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    regex: Regex,
    reason: String,
}

/// Compiled blocklist. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Screener {
    literals: Vec<String>,
    patterns: Vec<CompiledPattern>,
    absolute_file_path: Regex,
}

impl Screener {
    /// Compile the configured rules. Fails on an unparseable pattern.
    pub fn new(config: &ScreenConfig) -> Result<Self, ScreenError> {
        if let Some(index) = config.literals.iter().position(String::is_empty) {
            return Err(ScreenError::EmptyLiteral(index));
        }

        let patterns = config
            .patterns
            .iter()
            .map(|rule| {
                let regex = compile(&rule.pattern)?;
                Ok(CompiledPattern {
                    regex,
                    reason: rule.reason().to_string(),
                })
            })
            .collect::<Result<Vec<_>, ScreenError>>()?;

        Ok(Self {
            literals: config.literals.clone(),
            patterns,
            absolute_file_path: compile(ABSOLUTE_FILE_PATH)?,
        })
    }

    /// Number of literal and pattern rules
    pub fn rule_count(&self) -> usize {
        self.literals.len() + self.patterns.len()
    }

    /// Check source text against the blocklist.
    ///
    /// Literals run first over the normalized text, then patterns over the raw
    /// text, then the two fixed heuristics. The first violation wins.
    #[instrument(skip_all, fields(len = source.len()))]
    pub fn screen(&self, source: &str) -> Verdict {
        let normalized = normalize_whitespace(source);

        if let Some(literal) = self
            .literals
            .iter()
            .find(|literal| normalized.contains(literal.as_str()))
        {
            debug!(%literal, "literal rule matched");
            return Verdict::Reject(Rejection::Literal(literal.clone()));
        }

        // Patterns see the unmodified text; path and traversal rules depend on exact spacing
        if let Some(rule) = self.patterns.iter().find(|rule| rule.regex.is_match(source)) {
            debug!(pattern = %rule.regex.as_str(), "pattern rule matched");
            return Verdict::Reject(Rejection::Pattern(rule.reason.clone()));
        }

        if self.absolute_file_path.is_match(source) {
            return Verdict::Reject(Rejection::AbsoluteFilePath);
        }

        if source.contains(PARENT_DIRECTORY) {
            return Verdict::Reject(Rejection::ParentDirectory);
        }

        Verdict::Pass
    }
}

fn compile(pattern: &str) -> Result<Regex, ScreenError> {
    Regex::new(pattern).map_err(|source| ScreenError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Collapse every run of whitespace into a single space.
///
/// Leading and trailing runs are kept as one space so that a literal such as
/// `"native "` still matches at the end of the text.
pub fn normalize_whitespace(source: &str) -> String {
    let mut normalized = String::with_capacity(source.len());
    let mut in_run = false;
    for c in source.chars() {
        if matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0B' | '\x0C') {
            if !in_run {
                normalized.push(' ');
                in_run = true;
            }
        } else {
            normalized.push(c);
            in_run = false;
        }
    }
    normalized
}
