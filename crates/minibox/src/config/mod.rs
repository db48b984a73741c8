use serde::Deserialize;
use thiserror::Error;

pub use crate::config::toolchain::{
    CompileConfig, DEFAULT_DIAGNOSTIC_PATTERN, Placeholders, RunConfig, Toolchain,
};
use crate::screen::{ScreenConfig, ScreenError};
use crate::types::ExecutionLimits;
use crate::workspace::WorkspaceConfig;

mod loader;
pub mod toolchain;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../minibox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid blocklist: {0}")]
    Screen(#[from] ScreenError),

    #[error("invalid diagnostic pattern '{pattern}': {message}")]
    DiagnosticPattern { pattern: String, message: String },

    #[error("source name '{0}' must be a plain file name")]
    InvalidSourceName(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Minibox
///
/// Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Time and output limits applied to every run.
    /// Callers may override individual fields per run.
    #[serde(default)]
    pub limits: ExecutionLimits,

    /// Where per-run workspaces are created
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Compiler and launcher
    pub toolchain: Toolchain,

    /// Literal and pattern blocklists
    #[serde(default)]
    pub screen: ScreenConfig,
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for the given toolchain with default limits and an empty blocklist
    pub fn with_toolchain(toolchain: Toolchain) -> Self {
        Self {
            limits: ExecutionLimits::default(),
            workspace: WorkspaceConfig::default(),
            toolchain,
            screen: ScreenConfig::default(),
        }
    }

    /// Merge execution limits: defaults, then config, then per-run overrides
    pub fn effective_limits(&self, overrides: Option<&ExecutionLimits>) -> ExecutionLimits {
        let limits = ExecutionLimits::default().with_overrides(&self.limits);
        match overrides {
            Some(overrides) => limits.with_overrides(overrides),
            None => limits,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}
