//! Unix domain socket remote
//!
//! Attaches to a socket on which a runtime exposes a process's stdio. The
//! socket carries raw bytes with no framing and no exit status; the remote
//! closing its end is reported as an exit with an unknown code.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::net::UnixStream;

use super::{Connector, RemoteEndpoint};
use crate::error::AttachError;

/// Connects to a process's stdio exposed on a Unix domain socket
#[derive(Debug, Clone)]
pub struct UnixSocketConnector {
    path: PathBuf,
}

impl UnixSocketConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for UnixSocketConnector {
    fn target(&self) -> String {
        format!("unix:{}", self.path.display())
    }

    async fn connect(&self) -> Result<RemoteEndpoint, AttachError> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|e| AttachError::connection(self.target(), e))?;

        tracing::debug!(path = %self.path.display(), "Connected to unix socket");

        let (reader, writer) = stream.into_split();
        Ok(RemoteEndpoint::new(Box::new(reader), Box::new(writer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn connect_to_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let connector = UnixSocketConnector::new(dir.path().join("missing.sock"));

        let result = connector.connect().await;
        assert!(matches!(result, Err(AttachError::Connection { .. })));
    }

    #[tokio::test]
    async fn connect_streams_bytes_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let connector = UnixSocketConnector::new(&path);
        assert!(connector.target().starts_with("unix:"));

        let mut remote = connector.connect().await.unwrap();
        assert!(remote.exit.is_none());
        remote.writer.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        remote.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.await.unwrap();
    }
}
