//! The two forwarding directions of a session
//!
//! Each pipe runs as its own task and reports how it ended to the session
//! supervisor. Pipes never touch session state themselves.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::detach::{EscapeDetector, Scan};

/// Read size for both directions
pub(crate) const BUFFER_SIZE: usize = 8192;

/// Which end of the session an I/O failure happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Local,
    Remote,
}

/// How a pipe ended
#[derive(Debug)]
pub(crate) enum PipeEvent {
    /// The detach sequence was typed
    Detach,
    /// The remote closed its output
    RemoteClosed,
    Failed { side: Side, error: io::Error },
}

/// Forward local input to the remote, intercepting the detach sequence
///
/// Local EOF half-closes the remote's input and ends the pipe quietly; the
/// session keeps running until the remote finishes.
pub(crate) async fn forward_input<R, W>(
    mut input: R,
    mut remote: W,
    mut detector: EscapeDetector,
    events: mpsc::Sender<PipeEvent>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut forward = Vec::with_capacity(BUFFER_SIZE);

    loop {
        let n = match input.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Local input closed, shutting down remote input");
                if let Err(e) = remote.shutdown().await {
                    tracing::debug!(error = %e, "Failed to shut down remote input");
                }
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                let _ = events
                    .send(PipeEvent::Failed {
                        side: Side::Local,
                        error,
                    })
                    .await;
                return;
            }
        };

        forward.clear();
        let scan = detector.scan(&buf[..n], &mut forward);

        if !forward.is_empty()
            && let Err(error) = write_flush(&mut remote, &forward).await
        {
            let event = if is_disconnect(&error) {
                PipeEvent::RemoteClosed
            } else {
                PipeEvent::Failed {
                    side: Side::Remote,
                    error,
                }
            };
            let _ = events.send(event).await;
            return;
        }
        tracing::trace!(read = n, forwarded = forward.len(), "Forwarded input");

        if let Scan::Detach { consumed } = scan {
            tracing::debug!(
                discarded = n - consumed,
                "Detach sequence received, input forwarding stopped"
            );
            let _ = events.send(PipeEvent::Detach).await;
            return;
        }
    }
}

/// Forward remote output to the local sink, unmodified
pub(crate) async fn forward_output<R, W>(
    mut remote: R,
    mut output: W,
    events: mpsc::Sender<PipeEvent>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];

    let event = loop {
        let n = match remote.read(&mut buf).await {
            Ok(0) => break PipeEvent::RemoteClosed,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) if is_disconnect(&error) => break PipeEvent::RemoteClosed,
            Err(error) => {
                break PipeEvent::Failed {
                    side: Side::Remote,
                    error,
                };
            }
        };

        if let Err(error) = write_flush(&mut output, &buf[..n]).await {
            break PipeEvent::Failed {
                side: Side::Local,
                error,
            };
        }
        tracing::trace!(bytes = n, "Forwarded output");
    };

    let _ = events.send(event).await;
}

async fn write_flush<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

/// The peer went away rather than the stream breaking
fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}
