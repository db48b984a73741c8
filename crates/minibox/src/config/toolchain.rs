use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

const INVALID_SOURCE_NAME_CHARS: [char; 2] = ['/', '\\'];

/// Default pattern for compiler messages that carry a file and line, e.g.
/// `UserProgram.java:3: error: ';' expected`
pub const DEFAULT_DIAGNOSTIC_PATTERN: &str =
    r"^(?P<file>[^\s:][^:]*):(?P<line>\d+): (?:error|warning): (?P<message>.*)$";

/// Compiler and launcher used for every run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchain {
    /// Human-readable name (e.g., "Java (OpenJDK)")
    pub name: String,

    /// Name the compiled program is started by
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Compilation configuration
    pub compile: CompileConfig,

    /// Execution configuration
    pub run: RunConfig,
}

impl Toolchain {
    /// Values substituted into command templates for one workspace
    pub fn placeholders<'a>(&'a self, workspace: &'a Path) -> Placeholders<'a> {
        Placeholders {
            source: &self.compile.source_name,
            workspace,
            entry: &self.entry_point,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("toolchain has empty name".into()));
        }
        if self.entry_point.is_empty() {
            return Err(ConfigError::Invalid("toolchain has empty entry point".into()));
        }
        if self.compile.command.is_empty() {
            return Err(ConfigError::Invalid("toolchain has empty compile command".into()));
        }
        if self.run.command.is_empty() {
            return Err(ConfigError::Invalid("toolchain has empty run command".into()));
        }
        validate_source_name(&self.compile.source_name)
    }
}

fn validate_source_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Invalid("toolchain has empty source name".into()));
    }
    if name.contains("..") || name.contains(INVALID_SOURCE_NAME_CHARS) {
        return Err(ConfigError::InvalidSourceName(name.to_owned()));
    }
    Ok(())
}

fn default_entry_point() -> String {
    "UserProgram".to_owned()
}

/// Placeholder values for command expansion
#[derive(Debug, Clone, Copy)]
pub struct Placeholders<'a> {
    /// Source file name inside the workspace, `{source}`
    pub source: &'a str,
    /// Absolute workspace path, `{workspace}`
    pub workspace: &'a Path,
    /// Entry point name, `{entry}`
    pub entry: &'a str,
}

impl Placeholders<'_> {
    /// Expand placeholders in the given command
    pub fn expand(&self, command: &[String]) -> Vec<String> {
        let workspace = self.workspace.to_string_lossy();
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", self.source)
                    .replace("{workspace}", &workspace)
                    .replace("{entry}", self.entry)
            })
            .collect()
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {workspace}, {entry}
    pub command: Vec<String>,

    /// Fixed source file name in the workspace (e.g., "UserProgram.java")
    pub source_name: String,

    /// Regex for located compiler messages. Must have a `message` group and
    /// may have a `line` group.
    #[serde(default = "default_diagnostic_pattern")]
    pub diagnostic_pattern: String,
}

fn default_diagnostic_pattern() -> String {
    DEFAULT_DIAGNOSTIC_PATTERN.to_owned()
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {workspace}, {entry}
    pub command: Vec<String>,

    /// Environment variables removed from the child so it cannot widen its
    /// search scope beyond the workspace
    #[serde(default = "default_clear_env")]
    pub clear_env: Vec<String>,
}

fn default_clear_env() -> Vec<String> {
    ["CLASSPATH", "JAVA_TOOL_OPTIONS", "JDK_JAVA_OPTIONS", "_JAVA_OPTIONS"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}
