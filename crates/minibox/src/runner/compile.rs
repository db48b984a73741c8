//! Compilation step
//!
//! Writes the submitted source into the workspace and runs the configured
//! compiler against it.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::Toolchain;
use crate::process::resolve_command;
use crate::runner::{CompileError, DiagnosticParser};
use crate::types::Diagnostic;
use crate::workspace::Workspace;

/// Result of a compilation
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Whether the compiler reported no errors
    pub success: bool,

    /// Everything the compiler said, line-tagged, in emission order
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    /// Check if compilation was successful
    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// Compile source code in a workspace
#[instrument(skip(workspace, toolchain, parser, source), fields(workspace = %workspace.path().display()))]
pub async fn compile(
    workspace: &Workspace,
    toolchain: &Toolchain,
    parser: &DiagnosticParser,
    source: &str,
    time_limit: Duration,
) -> Result<CompileResult, CompileError> {
    let compile_config = &toolchain.compile;

    workspace
        .write_file(&compile_config.source_name, source.as_bytes())
        .await?;

    debug!(source_name = %compile_config.source_name, "wrote source file");

    let mut expanded_cmd = toolchain
        .placeholders(workspace.path())
        .expand(&compile_config.command);
    resolve_command(&mut expanded_cmd)?;

    debug!(?expanded_cmd, "running compiler");

    let (program, args) = expanded_cmd
        .split_first()
        .ok_or(CompileError::EmptyCommand)?;
    let child = Command::new(program)
        .args(args)
        .current_dir(workspace.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(CompileError::SpawnFailed)?;

    // Dropping the wait future on timeout kills the compiler
    let output = tokio::time::timeout(time_limit, child.wait_with_output())
        .await
        .map_err(|_| CompileError::Timeout(time_limit))?
        .map_err(CompileError::SpawnFailed)?;

    // Combine stdout and stderr for compiler output
    let mut compiler_output = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !compiler_output.is_empty() && !stderr.is_empty() && !compiler_output.ends_with('\n') {
        compiler_output.push('\n');
    }
    compiler_output.push_str(&stderr);

    let success = output.status.success();
    let mut diagnostics = parser.parse(&compiler_output);

    // A failed compile always carries at least one diagnostic
    if !success && diagnostics.is_empty() {
        diagnostics.push(Diagnostic::new(
            None,
            format!("compiler exited with {}", output.status),
        ));
    }

    debug!(
        success,
        status = %output.status,
        diagnostics = diagnostics.len(),
        "compilation complete"
    );

    Ok(CompileResult {
        success,
        diagnostics,
    })
}
