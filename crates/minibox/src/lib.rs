//! A library for running untrusted Java snippets.
//!
//! Minibox screens submitted source against a blocklist, compiles it in a
//! throwaway workspace and runs the result under a wall clock limit, streaming
//! the program's merged output while it runs. Every run ends in exactly one
//! [`RunOutcome`].
//!
//! # Features
//!
//! - **Screening**: literal and regex blocklists plus path heuristics, first match wins.
//! - **Disposable workspaces**: one fresh directory per run, always removed afterwards.
//! - **Diagnostics**: compiler output parsed into line-tagged messages.
//! - **Supervised execution**: merged stdout/stderr, incremental delivery, timeout kill.
//! - **TOML configuration**: toolchain commands, limits and blocklist in one file.
//!
//! The blocklist is a best-effort filter and not an isolation boundary; run
//! untrusted code under OS-level isolation as well.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Toolchain};
pub use runner::{CompileError, CompileResult, ExecuteError, OutputStream, Runner};
pub use screen::{Rejection, ScreenConfig, ScreenError, Screener, Verdict};
pub use types::{Diagnostic, ExecutionLimits, ExecutionResult, RunEvent, RunOutcome};
pub use workspace::{Workspace, WorkspaceConfig, WorkspaceError};

pub mod config;
pub mod process;
pub mod runner;
pub mod screen;
pub mod types;
pub mod workspace;
