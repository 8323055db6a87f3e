//! In-memory remote for tests and embedding
//!
//! [`channel`] returns a [`MemoryConnector`] to hand to [`crate::attach`] and
//! a [`MemoryRemote`] that plays the process: it reads what the client
//! forwards, writes output back and reports an exit status.

use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::watch;

use super::{Connector, ExitSignal, RemoteEndpoint};
use crate::error::AttachError;

/// Buffer size of the in-memory pipe in each direction
const PIPE_CAPACITY: usize = 64 * 1024;

/// Create a connected in-memory remote
pub fn channel(name: impl Into<String>) -> (MemoryConnector, MemoryRemote) {
    let (client, process) = tokio::io::duplex(PIPE_CAPACITY);
    let (exit_tx, exit) = ExitSignal::channel();

    let connector = MemoryConnector {
        name: name.into(),
        pending: Mutex::new(Some((client, exit))),
    };
    let remote = MemoryRemote {
        stream: process,
        exit_tx,
    };
    (connector, remote)
}

/// Client side of an in-memory remote; connects at most once
pub struct MemoryConnector {
    name: String,
    pending: Mutex<Option<(DuplexStream, ExitSignal)>>,
}

#[async_trait]
impl Connector for MemoryConnector {
    fn target(&self) -> String {
        format!("memory:{}", self.name)
    }

    async fn connect(&self) -> Result<RemoteEndpoint, AttachError> {
        let pending = self
            .pending
            .lock()
            .map_err(|_| AttachError::SessionClosed)?
            .take();

        let (stream, exit) = pending.ok_or_else(|| AttachError::AlreadyAttached(self.target()))?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(RemoteEndpoint::new(Box::new(reader), Box::new(writer)).with_exit(exit))
    }
}

/// Process side of an in-memory remote
///
/// Reading yields the bytes the client forwarded; writing produces output
/// for the client.
pub struct MemoryRemote {
    stream: DuplexStream,
    exit_tx: watch::Sender<Option<i32>>,
}

impl MemoryRemote {
    /// Report that the process exited with `code`
    pub fn exit(&self, code: i32) {
        self.exit_tx.send_replace(Some(code));
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.exit_code().is_none()
    }
}

impl AsyncRead for MemoryRemote {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryRemote {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn connector_hands_out_streams_once() {
        let (connector, _remote) = channel("test");
        assert_eq!(connector.target(), "memory:test");

        assert!(connector.connect().await.is_ok());
        assert!(matches!(
            connector.connect().await,
            Err(AttachError::AlreadyAttached(_))
        ));
    }

    #[tokio::test]
    async fn bytes_flow_between_client_and_process() {
        let (connector, mut remote) = channel("test");
        let mut endpoint = connector.connect().await.unwrap();

        endpoint.writer.write_all(b"in").await.unwrap();
        let mut buf = [0u8; 2];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"in");

        remote.write_all(b"out").await.unwrap();
        let mut buf = [0u8; 3];
        endpoint.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"out");
    }

    #[tokio::test]
    async fn exit_is_visible_to_client() {
        let (connector, remote) = channel("test");
        let endpoint = connector.connect().await.unwrap();
        let exit = endpoint.exit.unwrap();

        assert!(remote.is_running());
        remote.exit(7);
        assert!(!remote.is_running());
        assert_eq!(exit.code(), Some(7));
    }
}
