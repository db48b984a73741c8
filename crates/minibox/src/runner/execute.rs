//! Execution step
//!
//! Runs the compiled program in a child process whose stdout and stderr share
//! one pipe, forwards output line by line while the program runs, and kills
//! the program when it passes the wall clock limit.

use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::Toolchain;
use crate::process::resolve_command;
use crate::runner::ExecuteError;
use crate::types::{ExecutionLimits, ExecutionResult, RunEvent};
use crate::workspace::Workspace;

/// Destination for incremental run events
pub type OutputSink = mpsc::UnboundedSender<RunEvent>;

/// Synthetic last line appended when a program is killed for running too long
pub fn timeout_marker(timeout: Duration) -> String {
    format!("Execution timed out ({timeout:?}) and was killed.")
}

/// Execute the compiled program in its workspace
///
/// Output lines reach `sink` as they are read and are also returned in the
/// result. The call returns once the program has exited (plus a bounded
/// drain period) or has been killed.
#[instrument(skip_all, fields(workspace = %workspace.path().display()))]
pub async fn execute(
    workspace: &Workspace,
    toolchain: &Toolchain,
    limits: &ExecutionLimits,
    sink: Option<&OutputSink>,
) -> Result<ExecutionResult, ExecuteError> {
    let mut run_cmd = toolchain
        .placeholders(workspace.path())
        .expand(&toolchain.run.command);
    resolve_command(&mut run_cmd)?;

    debug!(?run_cmd, "executing program");

    let (program, args) = run_cmd.split_first().ok_or(ExecuteError::EmptyCommand)?;
    let (reader, writer) = std::io::pipe().map_err(ExecuteError::Pipe)?;

    let mut child = {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(workspace.path())
            .stdin(Stdio::null())
            .stdout(writer.try_clone().map_err(ExecuteError::Pipe)?)
            .stderr(writer)
            .kill_on_drop(true);
        for var in &toolchain.run.clear_env {
            command.env_remove(var);
        }
        command.spawn().map_err(ExecuteError::SpawnFailed)?
        // `command` drops here and closes our copies of the write end, so the
        // reader sees EOF once the program and its descendants are gone
    };

    let receiver =
        pipe::Receiver::from_owned_fd(OwnedFd::from(reader)).map_err(ExecuteError::Pipe)?;

    let collector = OutputCollector::new(limits.max_output_lines, sink.cloned());
    let mut reader_task = tokio::spawn(drain(receiver, collector.clone()));

    let timeout = limits.timeout();
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(?status, "program exited");
            if tokio::time::timeout(limits.grace(), &mut reader_task)
                .await
                .is_err()
            {
                warn!("output reader still busy after drain period, abandoning it");
                reader_task.abort();
            }

            Ok(ExecutionResult {
                timed_out: false,
                exit_code: status.code(),
                output: collector.finish(None),
            })
        }
        Ok(Err(source)) => {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "kill after failed wait");
            }
            reader_task.abort();
            Err(ExecuteError::Wait {
                source,
                output: collector.finish(None),
            })
        }
        Err(_) => {
            // No cooperative shutdown: the program is untrusted
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed out program");
            }
            reader_task.abort();
            info!(?timeout, "program timed out and was killed");

            Ok(ExecutionResult {
                timed_out: true,
                exit_code: None,
                output: collector.finish(Some(timeout_marker(timeout))),
            })
        }
    }
}

/// Read the merged stream line by line until EOF
async fn drain(receiver: pipe::Receiver, collector: OutputCollector) {
    let mut segments = BufReader::new(receiver).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(mut bytes)) => {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                collector.push(String::from_utf8_lossy(&bytes).into_owned());
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "error reading process output");
                collector.push(format!("Error reading process output: {e}"));
                break;
            }
        }
    }
}

/// Ordered, shared line buffer between the reader task and the supervisor
///
/// Once sealed, late lines from an abandoned reader are dropped so the
/// returned output (and the sink) never see anything after the final line.
#[derive(Debug, Clone)]
struct OutputCollector {
    state: Arc<Mutex<CollectorState>>,
    sink: Option<OutputSink>,
}

#[derive(Debug, Default)]
struct CollectorState {
    lines: Vec<String>,
    max_lines: Option<usize>,
    truncated: bool,
    sealed: bool,
}

impl OutputCollector {
    fn new(max_lines: Option<usize>, sink: Option<OutputSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CollectorState {
                max_lines,
                ..Default::default()
            })),
            sink,
        }
    }

    fn push(&self, line: String) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.sealed || state.truncated {
            return;
        }

        if let Some(max) = state.max_lines
            && state.lines.len() >= max
        {
            state.truncated = true;
            let notice = format!("... output truncated after {max} lines");
            self.forward(&notice);
            state.lines.push(notice);
            return;
        }

        // Forward under the lock so the sink sees the same order as `lines`
        self.forward(&line);
        state.lines.push(line);
    }

    /// Seal the buffer, append an optional final line and take the output
    fn finish(&self, last: Option<String>) -> Vec<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sealed = true;
        if let Some(line) = last {
            self.forward(&line);
            state.lines.push(line);
        }
        std::mem::take(&mut state.lines)
    }

    fn forward(&self, line: &str) {
        if let Some(sink) = &self.sink {
            // A closed sink means nobody is listening; the lines are still kept
            let _ = sink.send(RunEvent::Line(line.to_owned()));
        }
    }
}
