//! Session supervisor
//!
//! Owns the end of a session: it waits for the first of detach, remote exit,
//! remote close, I/O failure or caller close, stops both pipes, and only
//! then marks the session closed and delivers the outcome.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pipe::{PipeEvent, Side};
use crate::error::AttachError;
use crate::remote::ExitSignal;
use crate::session::{CompletionSender, ExitInfo, Outcome, StateWriter};

/// How long to wait for an exit status after the remote closed its output
const EXIT_STATUS_GRACE: Duration = Duration::from_secs(2);

/// How long to keep relaying output after the remote reported its exit
const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

enum First {
    Cancelled,
    Event(Option<PipeEvent>),
    Exited(i32),
}

pub(crate) struct Supervisor {
    pub(crate) session_id: String,
    pub(crate) events: mpsc::Receiver<PipeEvent>,
    pub(crate) pipes: Vec<JoinHandle<()>>,
    pub(crate) exit: Option<ExitSignal>,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: StateWriter,
    pub(crate) done: CompletionSender,
}

impl Supervisor {
    pub(crate) async fn run(mut self) {
        let first = tokio::select! {
            _ = self.cancel.cancelled() => First::Cancelled,
            event = self.events.recv() => First::Event(event),
            code = wait_exit(&mut self.exit) => First::Exited(code),
        };

        let outcome = match first {
            First::Cancelled => {
                tracing::debug!(session_id = %self.session_id, "Session closed by caller");
                self.state.detaching();
                Ok(self.exited().unwrap_or(ExitInfo::Detached))
            }
            First::Event(event) => self.resolve(event).await,
            First::Exited(code) => {
                self.drain_output().await;
                Ok(ExitInfo::Exited { code: Some(code) })
            }
        };

        for pipe in &self.pipes {
            pipe.abort();
        }
        for pipe in self.pipes.drain(..) {
            let _ = pipe.await;
        }
        self.state.close();

        match &outcome {
            Ok(info) => {
                tracing::info!(session_id = %self.session_id, outcome = %info, "Session ended")
            }
            Err(e) => tracing::warn!(session_id = %self.session_id, error = %e, "Session failed"),
        }
        self.done.send(outcome);
    }

    async fn resolve(&mut self, event: Option<PipeEvent>) -> Outcome {
        match event {
            Some(PipeEvent::Detach) => {
                self.state.detaching();
                // A remote that already exited wins over the detach
                match self.exited() {
                    Some(info) => {
                        tracing::debug!(
                            session_id = %self.session_id,
                            "Remote exited before detach completed"
                        );
                        Ok(info)
                    }
                    None => Ok(ExitInfo::Detached),
                }
            }
            Some(PipeEvent::RemoteClosed) | None => Ok(ExitInfo::Exited {
                code: self.exit_code().await,
            }),
            Some(PipeEvent::Failed { side, error }) => {
                if let Some(info) = self.exited() {
                    return Ok(info);
                }
                tracing::warn!(
                    session_id = %self.session_id,
                    local = side == Side::Local,
                    error = %error,
                    "Forwarding failed"
                );
                Err(AttachError::Io(error))
            }
        }
    }

    /// Exit info if the remote has already reported an exit
    fn exited(&self) -> Option<ExitInfo> {
        self.exit
            .as_ref()
            .and_then(ExitSignal::code)
            .map(|code| ExitInfo::Exited { code: Some(code) })
    }

    /// Wait briefly for an exit status; a caller close stops waiting
    async fn exit_code(&mut self) -> Option<i32> {
        let exit = self.exit.as_mut()?;
        let waited = tokio::select! {
            _ = self.cancel.cancelled() => None,
            code = tokio::time::timeout(EXIT_STATUS_GRACE, exit.wait()) => code.ok().flatten(),
        };
        waited.or_else(|| exit.code())
    }

    /// Let trailing output through until the remote closes or the drain
    /// window ends
    async fn drain_output(&mut self) {
        let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN;
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = tokio::time::timeout_at(deadline, self.events.recv()) => event,
            };
            match event {
                Ok(Some(PipeEvent::RemoteClosed)) | Ok(None) | Err(_) => break,
                Ok(Some(_)) => {}
            }
        }
    }
}

/// Resolve with the exit code, or never if the remote cannot report one
async fn wait_exit(exit: &mut Option<ExitSignal>) -> i32 {
    if let Some(signal) = exit
        && let Some(code) = signal.wait().await
    {
        return code;
    }
    std::future::pending().await
}
