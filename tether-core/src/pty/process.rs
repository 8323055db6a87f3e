//! A program running on a pseudo-terminal

use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

use super::{PtyConfig, PtyError};
use crate::error::AttachError;
use crate::remote::{Connector, ExitSignal, RemoteEndpoint};

/// Chunks of output queued towards an attached client
const OUTPUT_QUEUE: usize = 64;

/// Interval at which the child is polled for exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

type ChildHandle = Arc<Mutex<Box<dyn Child + Send + Sync>>>;

/// Where pty output currently goes
struct OutputSink {
    /// False once the pty stopped producing output
    open: bool,
    client: Option<mpsc::Sender<io::Result<Bytes>>>,
}

/// A program spawned on a pty
///
/// At most one client is attached at a time. Output produced while nobody
/// is attached is discarded. Dropping the process kills the program if it is
/// still running.
pub struct PtyProcess {
    command: String,
    pid: Option<u32>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: ChildHandle,
    input: mpsc::UnboundedSender<Bytes>,
    output: Arc<Mutex<OutputSink>>,
    exit: ExitSignal,
}

impl PtyProcess {
    /// Spawn a program on a new pty
    pub fn spawn(config: &PtyConfig) -> Result<Self, PtyError> {
        let command = config.command.display().to_string();
        tracing::info!(
            command = %command,
            args = ?config.args,
            cols = config.initial_cols,
            rows = config.initial_rows,
            "Spawning PTY process"
        );

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: config.initial_rows,
                cols: config.initial_cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::CreateFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.command);
        for arg in &config.args {
            cmd.arg(arg);
        }
        if let Some(dir) = &config.cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        // The master only sees EOF once every slave handle is closed
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::IoError(io::Error::other(e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::IoError(io::Error::other(e)))?;

        let pid = child.process_id();
        let child: ChildHandle = Arc::new(Mutex::new(child));
        let output = Arc::new(Mutex::new(OutputSink {
            open: true,
            client: None,
        }));
        let (input, input_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit) = ExitSignal::channel();

        spawn_thread("pty-reader", {
            let output = Arc::clone(&output);
            move || pump_output(reader, output)
        })?;
        spawn_thread("pty-writer", move || pump_input(writer, input_rx))?;
        spawn_thread("pty-exit", {
            let child = Arc::clone(&child);
            move || watch_exit(child, exit_tx)
        })?;

        Ok(Self {
            command,
            pid,
            master: Mutex::new(pair.master),
            child,
            input,
            output,
            exit,
        })
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.exit.code().is_none()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit.code()
    }

    /// Wait for the program to exit
    pub async fn wait(&self) -> Option<i32> {
        self.exit.clone().wait().await
    }

    /// Change the terminal size seen by the program
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        let master = self
            .master
            .lock()
            .map_err(|_| io::Error::other("pty master lock poisoned"))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::IoError(io::Error::other(e)))
    }

    /// Kill the program
    pub fn kill(&self) -> Result<(), PtyError> {
        let mut child = self
            .child
            .lock()
            .map_err(|_| io::Error::other("pty child lock poisoned"))?;
        child.kill()?;
        Ok(())
    }
}

#[async_trait]
impl Connector for PtyProcess {
    fn target(&self) -> String {
        match self.pid {
            Some(pid) => format!("pty:{}[{}]", self.command, pid),
            None => format!("pty:{}", self.command),
        }
    }

    async fn connect(&self) -> Result<RemoteEndpoint, AttachError> {
        let (tx, rx) = mpsc::channel(OUTPUT_QUEUE);
        {
            let mut sink = self
                .output
                .lock()
                .map_err(|_| io::Error::other("pty output lock poisoned"))?;
            if !sink.open || !self.is_running() {
                return Err(AttachError::connection(
                    self.target(),
                    io::Error::new(io::ErrorKind::NotConnected, "process has exited"),
                ));
            }
            if sink.client.as_ref().is_some_and(|client| !client.is_closed()) {
                return Err(AttachError::AlreadyAttached(self.target()));
            }
            sink.client = Some(tx);
        }

        let reader = StreamReader::new(ReceiverStream::new(rx));
        let writer = PtyInput {
            tx: self.input.clone(),
            shut: false,
        };
        Ok(RemoteEndpoint::new(Box::new(reader), Box::new(writer)).with_exit(self.exit.clone()))
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if self.is_running()
            && let Err(e) = self.kill()
        {
            tracing::debug!(command = %self.command, error = %e, "Failed to kill PTY process");
        }
    }
}

/// Input side handed to an attached client
struct PtyInput {
    tx: mpsc::UnboundedSender<Bytes>,
    shut: bool,
}

impl AsyncWrite for PtyInput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.shut || self.tx.send(Bytes::copy_from_slice(buf)).is_err() {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    /// A pty has no half-close; stop accepting writes from this client
    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shut = true;
        Poll::Ready(Ok(()))
    }
}

fn spawn_thread<F>(name: &str, f: F) -> Result<(), PtyError>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)?;
    Ok(())
}

/// Copy pty output to whichever client is attached
fn pump_output(mut reader: Box<dyn Read + Send>, output: Arc<Mutex<OutputSink>>) {
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports EIO once the program has exited
            Err(e) => {
                tracing::debug!(error = %e, "PTY read ended");
                break;
            }
        };

        // Clone the sender so a slow client never blocks attach/detach
        let client = match output.lock() {
            Ok(sink) => sink.client.clone(),
            Err(_) => break,
        };
        match client {
            Some(client) => {
                if client
                    .blocking_send(Ok(Bytes::copy_from_slice(&buf[..n])))
                    .is_err()
                {
                    tracing::trace!(bytes = n, "Client went away, discarding output");
                }
            }
            None => tracing::trace!(bytes = n, "No client attached, discarding output"),
        }
    }

    if let Ok(mut sink) = output.lock() {
        sink.open = false;
        // Dropping the sender ends the client's stream
        sink.client = None;
    }
}

/// Write client input to the pty
fn pump_input(mut writer: Box<dyn Write + Send>, mut input: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(chunk) = input.blocking_recv() {
        if let Err(e) = writer.write_all(&chunk).and_then(|_| writer.flush()) {
            tracing::debug!(error = %e, "PTY write failed");
            break;
        }
    }
}

/// Poll the child until it exits and publish its status
fn watch_exit(child: ChildHandle, exit_tx: watch::Sender<Option<i32>>) {
    loop {
        let status = match child.lock() {
            Ok(mut child) => child.try_wait(),
            Err(_) => return,
        };
        match status {
            Ok(Some(status)) => {
                let code = status.exit_code() as i32;
                tracing::debug!(code, "PTY process exited");
                exit_tx.send_replace(Some(code));
                return;
            }
            Ok(None) => std::thread::sleep(EXIT_POLL_INTERVAL),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll PTY process");
                return;
            }
        }
    }
}
