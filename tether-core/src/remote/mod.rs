//! Remote endpoints a session can attach to
//!
//! A remote is an opaque bidirectional byte stream onto a running process
//! (its stdin on one side, its merged stdout/stderr on the other) plus an
//! optional exit-status notification. Who runs the process is not our
//! concern; a [`Connector`] only knows how to reach it.

pub mod memory;
pub mod unix;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::error::AttachError;

pub use memory::{MemoryConnector, MemoryRemote};
pub use unix::UnixSocketConnector;

pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Knows how to open a stream onto a running process
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable identifier of the remote, used in logs and errors
    fn target(&self) -> String;

    /// Open the remote's streams
    ///
    /// Fails with [`AttachError::Connection`] when the remote is unavailable.
    async fn connect(&self) -> Result<RemoteEndpoint, AttachError>;
}

/// Connected streams of a remote process
pub struct RemoteEndpoint {
    /// Merged stdout/stderr of the remote
    pub reader: RemoteReader,
    /// Stdin of the remote
    pub writer: RemoteWriter,
    /// Exit notification, when the remote can report one
    pub exit: Option<ExitSignal>,
}

impl RemoteEndpoint {
    pub fn new(reader: RemoteReader, writer: RemoteWriter) -> Self {
        Self {
            reader,
            writer,
            exit: None,
        }
    }

    pub fn with_exit(mut self, exit: ExitSignal) -> Self {
        self.exit = Some(exit);
        self
    }
}

/// Receiving side of a remote's exit status
///
/// Holds `None` while the process is running and `Some(code)` once it has
/// exited.
#[derive(Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<Option<i32>>,
}

impl ExitSignal {
    /// Create a signal and the sender that reports the exit status
    pub fn channel() -> (watch::Sender<Option<i32>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// Exit code if the process has already exited
    pub fn code(&self) -> Option<i32> {
        *self.rx.borrow()
    }

    /// Wait until the process exits
    ///
    /// Returns `None` if the reporting side went away without an exit code.
    pub async fn wait(&mut self) -> Option<i32> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(code) => *code,
            Err(_) => None,
        }
    }
}
