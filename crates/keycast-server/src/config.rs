//! TOML-based configuration persistence for the server application.
//!
//! Reads and writes [`ServerConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\KeyCast\server.toml`
//! - Linux:    `~/.config/keycast/server.toml`
//! - macOS:    `~/Library/Application Support/KeyCast/server.toml`
//!
//! Fields annotated with `#[serde(default = "fn")]` fall back to their
//! defaults when absent, so a first run (no file) and an upgrade from an
//! older file both work without intervention.

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

/// Server configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Name announced to clients during discovery and authentication.
    #[serde(default = "default_computer_name")]
    pub computer_name: String,
    /// Session password. Empty means any client is accepted.
    #[serde(default)]
    pub password: String,
    /// TCP port the session protocol listens on.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// UDP port discovery announcements are broadcast to.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Whether the discovery broadcaster runs at all.
    #[serde(default = "default_true")]
    pub enable_discovery: bool,
    /// Whether client sessions are wrapped in TLS.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Screen stream capture rate in frames per second (clamped to 1–60).
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_computer_name() -> String {
    "KeyCast Server".to_string()
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
fn default_frame_rate() -> u32 {
    15
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            computer_name: default_computer_name(),
            password: String::new(),
            server_port: default_server_port(),
            discovery_port: default_discovery_port(),
            enable_discovery: true,
            use_tls: true,
            frame_rate: default_frame_rate(),
            log_level: default_log_level(),
        }
    }
}

/// Determines the platform-appropriate directory for config and TLS material.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the server config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("server.toml"))
}

/// Loads [`ServerConfig`] from disk, returning `ServerConfig::default()` if
/// the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: ServerConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServerConfig) -> Result<(), ConfigError> {
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

/// Resolves the platform config base directory including the app subdirectory.
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
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server_port, 45679);
        assert_eq!(cfg.discovery_port, 45678);
    }

    #[test]
    fn test_default_config_enables_discovery_and_tls() {
        let cfg = ServerConfig::default();
        assert!(cfg.enable_discovery);
        assert!(cfg.use_tls);
    }

    #[test]
    fn test_default_password_is_empty() {
        assert!(ServerConfig::default().password.is_empty());
    }

    #[test]
    fn test_default_frame_rate_is_fifteen() {
        assert_eq!(ServerConfig::default().frame_rate, 15);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = ServerConfig::default();
        cfg.computer_name = "Desk-A".to_string();
        cfg.password = "hunter2".to_string();
        cfg.server_port = 5000;

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ServerConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_unspecified_defaults() {
        let cfg: ServerConfig =
            toml::from_str("server_port = 9000\nuse_tls = false\n").expect("deserialize partial");
        assert_eq!(cfg.server_port, 9000);
        assert!(!cfg.use_tls);
        assert_eq!(cfg.discovery_port, 45678);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<ServerConfig, toml::de::Error> = toml::from_str("[[[ not valid");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_path_ends_with_server_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("server.toml"));
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
