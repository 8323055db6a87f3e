//! Error types for tether-core

use std::time::Duration;

use thiserror::Error;

pub use crate::detach::DetachKeysError;
pub use crate::pty::PtyError;

/// Errors from attaching to and waiting on a session
///
/// A detach is never an error: it ends a session successfully with
/// [`crate::ExitInfo::Detached`].
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("Failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?} waiting for session to close")]
    Timeout(Duration),

    #[error("Session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote already has a client attached: {0}")]
    AlreadyAttached(String),

    #[error("Session already closed")]
    SessionClosed,
}

impl AttachError {
    pub(crate) fn connection(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connection {
            target: target.into(),
            source,
        }
    }
}
