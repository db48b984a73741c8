use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::screen::Rejection;

/// Wall clock limit applied when none is configured
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 3.0;

/// Reader drain period applied after a natural exit when none is configured
pub const DEFAULT_DRAIN_GRACE_SECONDS: f64 = 1.0;

/// Compiler wall clock limit applied when none is configured
pub const DEFAULT_COMPILE_TIME_SECONDS: f64 = 30.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Wall clock time limit for the user program in seconds
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// How long to wait for buffered output after the program exits, in seconds
    #[serde(default)]
    pub drain_grace: Option<f64>,

    /// Wall clock time limit for the compiler in seconds
    #[serde(default)]
    pub compile_time_limit: Option<f64>,

    /// Maximum number of output lines kept from the program
    #[serde(default)]
    pub max_output_lines: Option<usize>,
}

impl ExecutionLimits {
    /// Create new limits with the defaults applied
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits with every field unset, useful as an override base
    pub fn unset() -> Self {
        Self {
            wall_time_limit: None,
            drain_grace: None,
            compile_time_limit: None,
            max_output_lines: None,
        }
    }

    /// Set the wall clock time limit in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the post-exit drain grace period in seconds
    pub fn with_drain_grace(mut self, seconds: f64) -> Self {
        self.drain_grace = Some(seconds);
        self
    }

    /// Set the compiler time limit in seconds
    pub fn with_compile_time_limit(mut self, seconds: f64) -> Self {
        self.compile_time_limit = Some(seconds);
        self
    }

    /// Set the maximum number of kept output lines
    pub fn with_max_output_lines(mut self, lines: usize) -> Self {
        self.max_output_lines = Some(lines);
        self
    }

    /// Apply overrides from another ExecutionLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ExecutionLimits) -> ExecutionLimits {
        ExecutionLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            drain_grace: overrides.drain_grace.or(self.drain_grace),
            compile_time_limit: overrides.compile_time_limit.or(self.compile_time_limit),
            max_output_lines: overrides.max_output_lines.or(self.max_output_lines),
        }
    }

    /// Program timeout, falling back to [`DEFAULT_TIMEOUT_SECONDS`]
    pub fn timeout(&self) -> Duration {
        seconds_or(self.wall_time_limit, DEFAULT_TIMEOUT_SECONDS)
    }

    /// Post-exit drain period, falling back to [`DEFAULT_DRAIN_GRACE_SECONDS`]
    pub fn grace(&self) -> Duration {
        seconds_or(self.drain_grace, DEFAULT_DRAIN_GRACE_SECONDS)
    }

    /// Compiler timeout, falling back to [`DEFAULT_COMPILE_TIME_SECONDS`]
    pub fn compile_timeout(&self) -> Duration {
        seconds_or(self.compile_time_limit, DEFAULT_COMPILE_TIME_SECONDS)
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            wall_time_limit: Some(DEFAULT_TIMEOUT_SECONDS),
            drain_grace: Some(DEFAULT_DRAIN_GRACE_SECONDS),
            compile_time_limit: Some(DEFAULT_COMPILE_TIME_SECONDS),
            max_output_lines: Some(10_000),
        }
    }
}

fn seconds_or(value: Option<f64>, fallback: f64) -> Duration {
    value
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .unwrap_or_else(|| Duration::from_secs_f64(fallback))
}

/// A single compiler message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Source line the message refers to, `None` when the compiler gave none
    pub line: Option<u32>,

    /// Message text, continuation lines joined with `\n`
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Line {line}: {}", self.message),
            None => write!(f, "Line ?: {}", self.message),
        }
    }
}

/// Result of running a compiled program
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Whether the program was killed because it ran past the timeout
    pub timed_out: bool,

    /// Exit code if the program exited on its own
    pub exit_code: Option<i32>,

    /// Merged stdout/stderr lines in emission order.
    /// Ends with the timeout marker when `timed_out` is set.
    pub output: Vec<String>,
}

/// Terminal state of one run. Exactly one is produced per submitted snippet.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The screener refused the source; nothing was compiled or executed
    Rejected { rejection: Rejection },

    /// The compiler reported errors; nothing was executed
    CompileFailed { diagnostics: Vec<Diagnostic> },

    /// The program ran past the wall clock limit and was killed
    TimedOut { output: Vec<String> },

    /// The program exited on its own
    Completed {
        output: Vec<String>,
        exit_code: Option<i32>,
    },

    /// Waiting on the program failed after it started
    RuntimeFailure { message: String, output: Vec<String> },

    /// Workspace creation, missing toolchain or spawn failure
    InfrastructureError { message: String },
}

impl RunOutcome {
    /// Short lowercase label, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            RunOutcome::Rejected { .. } => "rejected",
            RunOutcome::CompileFailed { .. } => "compile_failed",
            RunOutcome::TimedOut { .. } => "timed_out",
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::RuntimeFailure { .. } => "runtime_failure",
            RunOutcome::InfrastructureError { .. } => "infrastructure_error",
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    /// Program output captured for this run, empty if nothing ran
    pub fn output(&self) -> &[String] {
        match self {
            RunOutcome::TimedOut { output }
            | RunOutcome::Completed { output, .. }
            | RunOutcome::RuntimeFailure { output, .. } => output,
            _ => &[],
        }
    }

    /// Lines shown to the user for this outcome
    pub fn render(&self) -> Vec<String> {
        match self {
            RunOutcome::Rejected { rejection } => {
                vec![format!("Security Alert: {rejection}")]
            }
            RunOutcome::CompileFailed { diagnostics } => {
                let mut lines = Vec::with_capacity(diagnostics.len() + 1);
                lines.push("Compilation failed:".to_string());
                lines.extend(diagnostics.iter().map(ToString::to_string));
                lines
            }
            RunOutcome::TimedOut { output } | RunOutcome::Completed { output, .. } => {
                output.clone()
            }
            RunOutcome::RuntimeFailure { message, output } => {
                let mut lines = output.clone();
                lines.push(format!("Runtime error: {message}"));
                lines
            }
            RunOutcome::InfrastructureError { message } => vec![format!("Error: {message}")],
        }
    }
}

/// Event emitted by a streaming run
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Compilation succeeded; carries any warnings the compiler emitted
    Compiled { diagnostics: Vec<Diagnostic> },

    /// A line of program output, delivered as it arrives
    Line(String),

    /// The run reached its terminal state. Always the last event.
    Finished(RunOutcome),
}
