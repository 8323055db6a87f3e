use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use tether_core::{
    AttachError, DetachSequence, ExitInfo, LocalEndpoint, UnixSocketConnector, attach,
};

use crate::config::{AttachConfig, ConfigLoader};

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Unix socket of the process to attach to (defaults to `attach.socket` in config)
    pub socket: Option<PathBuf>,

    /// Key sequence that detaches, e.g. "ctrl-p,ctrl-q" or "ctrl-a,d"
    #[arg(long, value_name = "KEYS")]
    pub detach_keys: Option<DetachSequence>,

    /// Give up on the session after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Attach settings after applying flags over config
#[derive(Debug, PartialEq)]
struct AttachOptions {
    socket: PathBuf,
    detach_keys: DetachSequence,
    timeout: Option<Duration>,
}

impl AttachOptions {
    fn resolve(args: AttachArgs, config: &AttachConfig) -> Result<Self> {
        let socket = args
            .socket
            .or_else(|| config.socket.clone())
            .ok_or_else(|| anyhow!("no socket given and `attach.socket` is not configured"))?;

        Ok(Self {
            socket,
            detach_keys: args
                .detach_keys
                .unwrap_or_else(|| config.detach_keys.clone()),
            timeout: args
                .timeout
                .or(config.timeout_secs)
                .map(Duration::from_secs),
        })
    }
}

/// Attach stdio to a process and return the exit code to report
pub async fn run(args: AttachArgs) -> Result<i32> {
    let config = ConfigLoader::load()?;
    let options = AttachOptions::resolve(args, &config.attach)?;

    let connector = UnixSocketConnector::new(&options.socket);
    let local = LocalEndpoint::stdio().context("failed to set up the terminal")?;

    tracing::debug!(
        socket = %options.socket.display(),
        detach_keys = %options.detach_keys,
        "Attaching"
    );
    let mut session = attach(local, &connector, options.detach_keys).await?;

    let info = match session.wait(options.timeout).await {
        Ok(info) => info,
        Err(e @ AttachError::Timeout(_)) => {
            session.close().await;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    if info.is_detached() {
        eprintln!("detached from {}", session.target());
    }
    Ok(exit_code(&info))
}

fn exit_code(info: &ExitInfo) -> i32 {
    match info {
        ExitInfo::Exited { code: Some(code) } => *code,
        ExitInfo::Exited { code: None } | ExitInfo::Detached => 0,
    }
}
