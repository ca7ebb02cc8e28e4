//! TOML-based configuration persistence for the client application.
//!
//! Reads and writes [`ClientConfig`] to `client.toml` in the same platform
//! config directory the server uses (`KeyCast`/`keycast`).

use std::path::PathBuf;

use keycast_core::protocol::messages::{DEFAULT_DISCOVERY_PORT, DEFAULT_SERVER_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Client configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Name this machine reports to the server during authentication.
    #[serde(default = "default_computer_name")]
    pub computer_name: String,
    /// Server address to connect to. Empty means wait for discovery.
    #[serde(default)]
    pub server_address: String,
    /// Server TCP port.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// UDP port the discovery listener binds.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Session password presented to the server.
    #[serde(default)]
    pub password: String,
    /// Whether the session is wrapped in TLS.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Whether to reconnect automatically after an unexpected drop.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Delay between reconnect attempts, in seconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_computer_name() -> String {
    "KeyCast Client".to_string()
}
fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_true() -> bool {
    true
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            computer_name: default_computer_name(),
            server_address: String::new(),
            server_port: default_server_port(),
            discovery_port: default_discovery_port(),
            password: String::new(),
            use_tls: true,
            auto_reconnect: true,
            reconnect_delay_secs: default_reconnect_delay(),
            log_level: default_log_level(),
        }
    }
}

/// Determines the platform-appropriate directory for the config file.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the client config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("client.toml"))
}

/// Loads [`ClientConfig`] from disk, returning `ClientConfig::default()` if
/// the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: ClientConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
pub fn save_config(config: &ClientConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KeyCast"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keycast"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KeyCast")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_ports() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.server_port, 45679);
        assert_eq!(cfg.discovery_port, 45678);
    }

    #[test]
    fn test_default_config_reconnects_every_five_seconds() {
        let cfg = ClientConfig::default();
        assert!(cfg.auto_reconnect);
        assert_eq!(cfg.reconnect_delay_secs, 5);
    }

    #[test]
    fn test_default_server_address_is_empty() {
        assert!(ClientConfig::default().server_address.is_empty());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = ClientConfig::default();
        cfg.server_address = "192.168.1.10".to_string();
        cfg.password = "hunter2".to_string();
        cfg.use_tls = false;

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ClientConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: ClientConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_unspecified_defaults() {
        let cfg: ClientConfig = toml::from_str("server_address = \"10.0.0.2\"\n")
            .expect("deserialize partial");
        assert_eq!(cfg.server_address, "10.0.0.2");
        assert_eq!(cfg.server_port, 45679);
        assert!(cfg.use_tls);
    }
}
