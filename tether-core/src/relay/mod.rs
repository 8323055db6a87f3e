//! Stream relay
//!
//! [`attach`] connects a [`LocalEndpoint`] to a remote through a
//! [`Connector`] and returns a running [`Session`]. Two tasks copy bytes,
//! one per direction, with the detach detector inline on the input path. A
//! supervisor task decides how the session ended and is the only writer of
//! its state.
//!
//! ```text
//!  local input ──► EscapeDetector ──► remote stdin
//!  local output ◄──────────────────── remote stdout/stderr
//!                        │
//!                   Supervisor ──► SessionState / Completion
//! ```

mod pipe;
mod supervisor;

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::detach::{DetachSequence, EscapeDetector};
use crate::error::AttachError;
use crate::remote::Connector;
use crate::session::{self, Completion, ExitInfo, SessionState};
use crate::terminal::{LocalEndpoint, RawTerminal};

use supervisor::Supervisor;

/// Attach a local endpoint to a remote process
///
/// The local endpoint is owned by the returned session; any terminal mode
/// change it carries is undone when the session ends, is closed, or is
/// dropped. If the remote cannot be reached, the endpoint is released
/// immediately and [`AttachError::Connection`] is returned.
pub async fn attach(
    local: LocalEndpoint,
    connector: &dyn Connector,
    detach: DetachSequence,
) -> Result<Session, AttachError> {
    let target = connector.target();
    let remote = connector.connect().await?;

    let id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        session_id = %id,
        target = %target,
        detach_keys = %detach,
        raw = local.is_raw(),
        "Attached"
    );

    let LocalEndpoint {
        input,
        output,
        terminal,
    } = local;

    let (events_tx, events_rx) = mpsc::channel(4);
    let input_pipe = tokio::spawn(pipe::forward_input(
        input,
        remote.writer,
        EscapeDetector::new(detach.clone()),
        events_tx.clone(),
    ));
    let output_pipe = tokio::spawn(pipe::forward_output(remote.reader, output, events_tx));

    let (state_writer, state) = session::state_channel();
    let (done, completion) = session::completion();
    let cancel = CancellationToken::new();

    let supervisor = Supervisor {
        session_id: id.clone(),
        events: events_rx,
        pipes: vec![input_pipe, output_pipe],
        exit: remote.exit,
        cancel: cancel.clone(),
        state: state_writer,
        done,
    };

    Ok(Session {
        id,
        target,
        detach,
        state,
        completion,
        cancel,
        supervisor: Some(tokio::spawn(supervisor.run())),
        terminal,
    })
}

/// One attach of a local endpoint to a remote process
pub struct Session {
    id: String,
    target: String,
    detach: DetachSequence,
    state: watch::Receiver<SessionState>,
    completion: Completion,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
    terminal: Option<RawTerminal>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier of the remote this session is attached to
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn detach_sequence(&self) -> &DetachSequence {
        &self.detach
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session is closed
    ///
    /// With a `deadline`, gives up with [`AttachError::Timeout`] once it
    /// elapses; the session stays attached and `wait` can be called again.
    /// Once the session has ended, every call returns the same [`ExitInfo`].
    /// An I/O failure is returned by the first call only.
    pub async fn wait(&mut self, deadline: Option<Duration>) -> Result<ExitInfo, AttachError> {
        let outcome = match deadline {
            Some(limit) => tokio::time::timeout(limit, self.completion.recv())
                .await
                .map_err(|_| AttachError::Timeout(limit))?,
            None => self.completion.recv().await,
        };
        self.release_terminal();
        outcome
    }

    /// Stop forwarding and release the local terminal
    ///
    /// The remote is left running. Calling this on a closed session does
    /// nothing.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.supervisor.take()
            && let Err(e) = task.await
        {
            tracing::warn!(session_id = %self.id, error = %e, "Session supervisor failed");
        }
        self.release_terminal();
    }

    fn release_terminal(&mut self) {
        if self.terminal.take().is_some() {
            tracing::debug!(session_id = %self.id, "Restored terminal mode");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.release_terminal();
    }
}
