use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tether_core::DetachSequence;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTetherConfig {
    #[serde(default)]
    pub attach: RawAttachConfig,
}

/// Attach config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawAttachConfig {
    /// Key list that ends an attach, e.g. "ctrl-p,ctrl-q"
    pub detach_keys: Option<DetachSequence>,

    /// Give up waiting on a session after this many seconds
    pub timeout_secs: Option<u64>,

    /// Socket to attach to when none is given on the command line
    pub socket: Option<PathBuf>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TetherConfig {
    #[serde(default)]
    pub attach: AttachConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AttachConfig {
    /// Key list that ends an attach
    #[serde(default)]
    pub detach_keys: DetachSequence,

    /// Optional deadline for a session, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Default attach target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = TetherConfig::default();
        assert_eq!(config.attach.detach_keys.as_bytes(), &[16, 17]);
        assert!(config.attach.timeout_secs.is_none());
        assert!(config.attach.socket.is_none());
    }

    #[test]
    fn test_raw_config_parses_partial_section() {
        let raw: RawTetherConfig = toml::from_str("[attach]\ntimeout_secs = 5\n").unwrap();
        assert_eq!(raw.attach.timeout_secs, Some(5));
        assert!(raw.attach.detach_keys.is_none());
        assert!(raw.attach.socket.is_none());
    }

    #[test]
    fn test_raw_config_parses_detach_keys() {
        let raw: RawTetherConfig =
            toml::from_str("[attach]\ndetach_keys = \"ctrl-a,d\"\n").unwrap();
        assert_eq!(raw.attach.detach_keys.unwrap().as_bytes(), &[1, b'd']);
    }

    #[test]
    fn test_raw_config_rejects_bad_detach_keys() {
        let result = toml::from_str::<RawTetherConfig>("[attach]\ndetach_keys = \"ctrl-9\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_omits_unset_values() {
        let toml = toml::to_string_pretty(&TetherConfig::default()).unwrap();
        assert!(toml.contains("[attach]"));
        assert!(toml.contains("detach_keys = \"ctrl-p,ctrl-q\""));
        assert!(!toml.contains("timeout_secs"));
        assert!(!toml.contains("socket"));
    }
}
