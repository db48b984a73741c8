//! Run orchestration for Minibox
//!
//! Sequences screening, workspace acquisition, compilation and execution,
//! stopping at the first step that does not advance, and turns every failure
//! into a [`RunOutcome`].

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

pub use crate::runner::compile::{CompileResult, compile};
pub use crate::runner::diagnostics::DiagnosticParser;
pub use crate::runner::execute::{OutputSink, execute, timeout_marker};
pub use crate::runner::stream::OutputStream;

mod compile;
mod diagnostics;
mod execute;
mod stream;

use crate::{
    config::{Config, ConfigError},
    process::CommandNotFound,
    screen::{Screener, Verdict},
    types::{ExecutionLimits, RunEvent, RunOutcome},
    workspace::{Workspace, WorkspaceError},
};

/// Errors that occur during compilation
///
/// A compile that finishes with errors is not one of these; it is a
/// [`CompileResult`] with `success == false`.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compiler unavailable: {0}")]
    ToolchainUnavailable(#[from] CommandNotFound),

    #[error("compile command is empty")]
    EmptyCommand,

    #[error("failed to run compiler: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("compilation timed out after {0:?}")]
    Timeout(Duration),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// Errors that occur during execution
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("launcher unavailable: {0}")]
    LauncherUnavailable(#[from] CommandNotFound),

    #[error("run command is empty")]
    EmptyCommand,

    #[error("failed to create output pipe: {0}")]
    Pipe(#[source] std::io::Error),

    #[error("failed to start program: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// Waiting on the running program failed; keeps what it printed so far
    #[error("failed while waiting for program: {source}")]
    Wait {
        source: std::io::Error,
        output: Vec<String>,
    },
}

/// Screens, compiles and runs untrusted snippets
///
/// Each run gets its own workspace and child process, so a single runner can
/// serve concurrent runs.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Config,
    screener: Screener,
    parser: DiagnosticParser,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let screener = Screener::new(&config.screen)?;
        let parser = DiagnosticParser::new(&config.toolchain.compile.diagnostic_pattern)?;
        Ok(Self {
            config,
            screener,
            parser,
        })
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default()).expect("embedded default config should be valid")
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the compiled blocklist
    pub fn screener(&self) -> &Screener {
        &self.screener
    }

    /// Run a snippet and return its outcome once it is over
    pub async fn run(&self, source: &str) -> RunOutcome {
        self.run_with(source, None, None).await
    }

    /// Run a snippet with per-run limit overrides
    pub async fn run_with_limits(&self, source: &str, limits: &ExecutionLimits) -> RunOutcome {
        self.run_with(source, Some(limits), None).await
    }

    /// Run a snippet in the background and stream its events
    ///
    /// This is the entry point for presentation layers: lines arrive while the
    /// program runs and the stream ends with exactly one
    /// [`RunEvent::Finished`].
    pub fn stream(&self, source: impl Into<String>, limits: Option<ExecutionLimits>) -> OutputStream {
        let runner = self.clone();
        let source = source.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let outcome = runner.run_with(&source, limits.as_ref(), Some(&tx)).await;
            let _ = tx.send(RunEvent::Finished(outcome));
        });

        OutputStream::new(rx, handle)
    }

    /// Run the full pipeline, optionally forwarding events to `sink`
    ///
    /// Overrides are checked like configured limits; an invalid one ends the
    /// run as an infrastructure error before anything is screened or spawned.
    /// The workspace is released on every path out of the pipeline. If this
    /// future is dropped mid-run, the workspace and child process are still
    /// cleaned up on drop.
    #[instrument(skip_all, fields(len = source.len()))]
    pub async fn run_with(
        &self,
        source: &str,
        limits: Option<&ExecutionLimits>,
        sink: Option<&OutputSink>,
    ) -> RunOutcome {
        if let Some(Err(e)) = limits.map(ExecutionLimits::validate) {
            warn!(error = %e, "rejected per-run limits");
            return RunOutcome::InfrastructureError {
                message: e.to_string(),
            };
        }

        if let Verdict::Reject(rejection) = self.screener.screen(source) {
            info!(rule = %rejection.rule(), "snippet rejected");
            return RunOutcome::Rejected { rejection };
        }

        let workspace = match Workspace::acquire(&self.config.workspace) {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(error = %e, "could not create workspace");
                return RunOutcome::InfrastructureError {
                    message: e.to_string(),
                };
            }
        };

        let limits = self.config.effective_limits(limits);
        let outcome = self.compile_and_execute(&workspace, source, &limits, sink).await;
        workspace.release().await;

        info!(outcome = outcome.kind(), "run finished");
        outcome
    }

    async fn compile_and_execute(
        &self,
        workspace: &Workspace,
        source: &str,
        limits: &ExecutionLimits,
        sink: Option<&OutputSink>,
    ) -> RunOutcome {
        let toolchain = &self.config.toolchain;

        let compiled = match compile(
            workspace,
            toolchain,
            &self.parser,
            source,
            limits.compile_timeout(),
        )
        .await
        {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(error = %e, "compilation could not run");
                return RunOutcome::InfrastructureError {
                    message: e.to_string(),
                };
            }
        };

        if !compiled.is_success() {
            debug!(diagnostics = compiled.diagnostics.len(), "compilation failed");
            return RunOutcome::CompileFailed {
                diagnostics: compiled.diagnostics,
            };
        }

        if let Some(sink) = sink {
            let _ = sink.send(RunEvent::Compiled {
                diagnostics: compiled.diagnostics,
            });
        }

        match execute(workspace, toolchain, limits, sink).await {
            Ok(result) if result.timed_out => RunOutcome::TimedOut {
                output: result.output,
            },
            Ok(result) => RunOutcome::Completed {
                output: result.output,
                exit_code: result.exit_code,
            },
            Err(ExecuteError::Wait { source, output }) => RunOutcome::RuntimeFailure {
                message: source.to_string(),
                output,
            },
            Err(e) => {
                warn!(error = %e, "program could not start");
                RunOutcome::InfrastructureError {
                    message: e.to_string(),
                }
            }
        }
    }
}
