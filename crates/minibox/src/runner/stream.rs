//! Event stream for a run in progress

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::{RunEvent, RunOutcome};

/// Events of one run, in order
///
/// Produced by [`Runner::stream`](crate::Runner::stream). The run happens on a
/// background task; dropping the stream does not cancel it, the run still
/// finishes and releases its workspace.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::UnboundedReceiver<RunEvent>,
    finished: bool,
    _handle: JoinHandle<()>,
}

impl OutputStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<RunEvent>, handle: JoinHandle<()>) -> Self {
        Self {
            rx,
            finished: false,
            _handle: handle,
        }
    }

    /// Receive the next event
    ///
    /// Returns `None` after [`RunEvent::Finished`] has been delivered.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await;
        if matches!(event, Some(RunEvent::Finished(_)) | None) {
            self.finished = true;
        }
        event
    }

    /// Skip the remaining events and return the outcome
    pub async fn outcome(mut self) -> RunOutcome {
        while let Some(event) = self.recv().await {
            if let RunEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        RunOutcome::InfrastructureError {
            message: "run ended without an outcome".to_owned(),
        }
    }
}
