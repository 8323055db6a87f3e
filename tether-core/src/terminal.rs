//! Local terminal handling
//!
//! The local side of a session is any async reader/writer pair. When it is
//! the process's own stdio and stdin is a terminal, the terminal is switched
//! to raw mode for the lifetime of the session so keystrokes (including the
//! detach keys) reach us byte by byte instead of being line-edited or turned
//! into signals.

use std::io::{self, IsTerminal};

use crossterm::terminal;
use tokio::io::{AsyncRead, AsyncWrite};

pub type LocalReader = Box<dyn AsyncRead + Send + Unpin>;
pub type LocalWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// RAII wrapper for raw terminal mode
///
/// Enables raw mode on construction and restores the previous state on drop.
pub struct RawTerminal {
    was_raw: bool,
}

impl RawTerminal {
    /// Enable raw terminal mode
    ///
    /// If the terminal is already in raw mode, this is a no-op and drop
    /// leaves it raw.
    pub fn new() -> io::Result<Self> {
        let was_raw = terminal::is_raw_mode_enabled()?;
        if !was_raw {
            terminal::enable_raw_mode()?;
        }
        Ok(Self { was_raw })
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if !self.was_raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Local input source and output sink of a session
pub struct LocalEndpoint {
    pub(crate) input: LocalReader,
    pub(crate) output: LocalWriter,
    pub(crate) terminal: Option<RawTerminal>,
}

impl LocalEndpoint {
    /// Wrap an arbitrary reader/writer pair; terminal modes are untouched
    pub fn new(input: LocalReader, output: LocalWriter) -> Self {
        Self {
            input,
            output,
            terminal: None,
        }
    }

    /// Use the process's stdin and stdout
    ///
    /// Raw mode is enabled only when stdin is a terminal, so piped input and
    /// redirected output keep working without touching terminal state.
    pub fn stdio() -> io::Result<Self> {
        let terminal = if io::stdin().is_terminal() {
            tracing::debug!("stdin is a terminal, enabling raw mode");
            Some(RawTerminal::new()?)
        } else {
            None
        };

        Ok(Self {
            input: Box::new(tokio::io::stdin()),
            output: Box::new(tokio::io::stdout()),
            terminal,
        })
    }

    pub fn is_raw(&self) -> bool {
        self.terminal.is_some()
    }
}
