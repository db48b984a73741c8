//! Configuration file loading for Minibox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};
use crate::runner::DiagnosticParser;
use crate::screen::Screener;
use crate::types::ExecutionLimits;

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        Self::finish(config.try_deserialize()?)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        Self::finish(config.try_deserialize()?)
    }

    /// Fill limits the file left unset, then validate
    fn finish(mut config: Config) -> Result<Self, ConfigError> {
        config.limits = ExecutionLimits::default().with_overrides(&config.limits);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Patterns are compiled here so that a bad rule is a startup error
    /// rather than a per-run failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        if self.workspace.prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "workspace prefix '{}' must not contain path separators",
                self.workspace.prefix
            )));
        }

        self.toolchain.validate()?;
        Screener::new(&self.screen)?;
        DiagnosticParser::new(&self.toolchain.compile.diagnostic_pattern)?;

        Ok(())
    }
}

impl ExecutionLimits {
    /// Check that every set field is usable.
    ///
    /// Unset fields are fine; they fall back to the defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("wall_time_limit", self.wall_time_limit),
            ("compile_time_limit", self.compile_time_limit),
        ] {
            if let Some(seconds) = value
                && !(seconds.is_finite() && seconds > 0.0)
            {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number of seconds, got {seconds}"
                )));
            }
        }
        if let Some(grace) = self.drain_grace
            && !(grace.is_finite() && grace >= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "drain_grace must not be negative, got {grace}"
            )));
        }
        if self.max_output_lines == Some(0) {
            return Err(ConfigError::Invalid(
                "max_output_lines must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
