use super::types::{AttachConfig, RawAttachConfig, RawTetherConfig, TetherConfig};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<TetherConfig> {
        let mut raw = RawTetherConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tether").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with TETHER_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("TETHER_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".tether/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<RawTetherConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawTetherConfig, overlay: RawTetherConfig) -> RawTetherConfig {
        RawTetherConfig {
            attach: RawAttachConfig {
                detach_keys: overlay.attach.detach_keys.or(base.attach.detach_keys),
                timeout_secs: overlay.attach.timeout_secs.or(base.attach.timeout_secs),
                socket: overlay.attach.socket.or(base.attach.socket),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawTetherConfig) -> TetherConfig {
        TetherConfig {
            attach: AttachConfig {
                detach_keys: raw.attach.detach_keys.unwrap_or_default(),
                timeout_secs: raw.attach.timeout_secs,
                socket: raw.attach.socket,
            },
        }
    }

    /// Load config from a specific path (for testing)
    #[cfg(test)]
    pub fn load_from_path(path: &Path) -> Result<TetherConfig> {
        if path.exists() {
            Ok(Self::finalize(Self::read_raw(path)?))
        } else {
            Ok(TetherConfig::default())
        }
    }
}
