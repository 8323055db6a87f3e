//! tether-core: attach a terminal to a running process and detach at will
//!
//! This crate provides the pieces of an attach client:
//!
//! - **Stream relay** - [`attach`] and [`Session`] copy bytes between a
//!   [`LocalEndpoint`] and a remote process until the remote ends or the user
//!   detaches
//! - **Detach detection** - [`EscapeDetector`] intercepts the configured
//!   [`DetachSequence`] (ctrl-p, ctrl-q by default) on the input path
//! - **Remotes** - the [`Connector`] trait with Unix socket, in-memory and
//!   pseudo-terminal implementations
//!
//! # Quick Start
//!
//! ```no_run
//! use tether_core::{attach, DetachSequence, LocalEndpoint, UnixSocketConnector};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = UnixSocketConnector::new("/run/app.sock");
//!     let local = LocalEndpoint::stdio()?;
//!
//!     let mut session = attach(local, &connector, DetachSequence::default()).await?;
//!     let info = session.wait(None).await?;
//!     eprintln!("session {}", info);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Session ─────────────────────────────┐
//! │  LocalEndpoint ── input pipe ── EscapeDetector ──► RemoteEndpoint │
//! │  LocalEndpoint ◄───────────── output pipe ───────── RemoteEndpoint │
//! │                    Supervisor ─► state + completion              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod detach;
pub mod error;
pub mod pty;
pub mod relay;
pub mod remote;
pub mod session;
pub mod terminal;

// Re-export key types for convenience
pub use detach::{DEFAULT_DETACH_KEYS, DetachSequence, DetectorState, EscapeDetector, Scan, Step};
pub use error::{AttachError, DetachKeysError, PtyError};
pub use pty::{PtyConfig, PtyProcess};
pub use relay::{Session, attach};
pub use remote::{
    Connector, ExitSignal, MemoryConnector, MemoryRemote, RemoteEndpoint, UnixSocketConnector,
};
pub use session::{ExitInfo, SessionState};
pub use terminal::{LocalEndpoint, RawTerminal};
