//! Processes running in a pseudo-terminal
//!
//! [`PtyProcess`] spawns a program on a pty and exposes it as a
//! [`crate::remote::Connector`], so a session can attach to it, detach, and
//! attach again while the program keeps running.

mod config;
mod error;
mod process;

pub use config::PtyConfig;
pub use error::PtyError;
pub use process::PtyProcess;
