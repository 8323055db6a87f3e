//! `tether config`: inspect the layered configuration

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{ConfigLoader, TetherConfig};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show {
        /// Print the built-in defaults without reading any config file
        #[arg(long)]
        defaults: bool,
    },
    /// List config files from lowest to highest precedence
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show { defaults } => {
            let config = if defaults {
                TetherConfig::default()
            } else {
                ConfigLoader::load()?
            };
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            for (layer, path) in layers() {
                println!("{}", describe(layer, path.as_deref()));
            }
        }
    }
    Ok(())
}

/// Config layers in the order they are merged
fn layers() -> [(&'static str, Option<PathBuf>); 2] {
    [
        ("user", ConfigLoader::user_config_path()),
        ("project", Some(ConfigLoader::project_config_path())),
    ]
}

fn describe(layer: &str, path: Option<&Path>) -> String {
    match path {
        Some(path) if path.exists() => format!("{:<8} {}", layer, path.display()),
        Some(path) => format!("{:<8} {} (not found)", layer, path.display()),
        None => format!("{:<8} (no home directory)", layer),
    }
}
