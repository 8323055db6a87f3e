//! PTY configuration

use std::path::PathBuf;

/// Configuration for a process spawned in a pseudo-terminal
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Program to run
    pub command: PathBuf,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory; inherits ours when unset
    pub cwd: Option<PathBuf>,
    /// Initial terminal columns
    pub initial_cols: u16,
    /// Initial terminal rows
    pub initial_rows: u16,
}

impl PtyConfig {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            initial_cols: 80,
            initial_rows: 24,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl Default for PtyConfig {
    /// The user's shell, falling back to `sh`
    fn default() -> Self {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "sh".to_string());
        Self::new(shell)
    }
}
