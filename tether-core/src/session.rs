//! Session state and completion signalling
//!
//! A session moves `Attached -> Closed` when the remote ends, or
//! `Attached -> Detaching -> Closed` when the detach sequence is typed. The
//! transition happens once and is written by a single owner, the session
//! supervisor, through a `StateWriter`. The outcome is delivered to the
//! caller through a one-shot `Completion`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};

use crate::error::AttachError;

/// State of an attach session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Forwarding in both directions
    Attached,
    /// Detach sequence seen, forwarding is being torn down
    Detaching,
    /// No more bytes will be forwarded
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Attached => write!(f, "attached"),
            SessionState::Detaching => write!(f, "detaching"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitInfo {
    /// The remote process ended; `code` is `None` when the remote cannot
    /// report a status
    Exited { code: Option<i32> },
    /// The client left; the remote keeps running
    Detached,
}

impl ExitInfo {
    pub fn is_detached(&self) -> bool {
        matches!(self, ExitInfo::Detached)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitInfo::Exited { code } => *code,
            ExitInfo::Detached => None,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitInfo::Exited { code: Some(code) } => write!(f, "exited with code {}", code),
            ExitInfo::Exited { code: None } => write!(f, "exited"),
            ExitInfo::Detached => write!(f, "detached"),
        }
    }
}

pub(crate) type Outcome = Result<ExitInfo, AttachError>;

/// Create the writer/observer pair for a new session
pub(crate) fn state_channel() -> (StateWriter, watch::Receiver<SessionState>) {
    let (tx, rx) = watch::channel(SessionState::Attached);
    (StateWriter { tx }, rx)
}

/// Sole writer of a session's state
pub(crate) struct StateWriter {
    tx: watch::Sender<SessionState>,
}

impl StateWriter {
    pub(crate) fn detaching(&self) {
        self.tx.send_if_modified(|state| {
            if *state == SessionState::Attached {
                *state = SessionState::Detaching;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn close(&self) {
        self.tx.send_if_modified(|state| {
            if *state == SessionState::Closed {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        });
    }
}

/// Create the sending and receiving halves of a session's completion
pub(crate) fn completion() -> (CompletionSender, Completion) {
    let (tx, rx) = oneshot::channel();
    (
        CompletionSender { tx },
        Completion {
            rx: Some(rx),
            outcome: None,
        },
    )
}

pub(crate) struct CompletionSender {
    tx: oneshot::Sender<Outcome>,
}

impl CompletionSender {
    pub(crate) fn send(self, outcome: Outcome) {
        // Receiver gone means the session was dropped; nobody is waiting
        let _ = self.tx.send(outcome);
    }
}

/// Caller side of the completion signal
///
/// The signal is consumed once. A successful outcome is remembered so later
/// waits return it again; an error is reported a single time.
pub(crate) struct Completion {
    rx: Option<oneshot::Receiver<Outcome>>,
    outcome: Option<ExitInfo>,
}

impl Completion {
    /// Wait for the outcome, without consuming the signal if the future is
    /// dropped before it resolves
    pub(crate) async fn recv(&mut self) -> Outcome {
        if let Some(info) = self.outcome {
            return Ok(info);
        }
        let rx = self.rx.as_mut().ok_or(AttachError::SessionClosed)?;
        let outcome = rx.await;
        self.rx = None;

        let info = outcome.map_err(|_| AttachError::SessionClosed)??;
        self.outcome = Some(info);
        Ok(info)
    }
}
