//! TOML-based configuration for the device key manager.
//!
//! Reads and writes `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\DevKey\config.toml`
//! - Linux:    `~/.config/devkey/config.toml`
//! - macOS:    `~/Library/Application Support/DevKey/config.toml`
//!
//! ```toml
//! [service]
//! log_level = "info"
//! delivery_timeout_ms = 2000
//!
//! [ipc]
//! bind_address = "127.0.0.1:24900"
//! ```
//!
//! Every field has a `#[serde(default = "...")]`, so a missing file, a missing
//! section, or a missing key all fall back to the defaults above.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dispatch_keys::DispatcherConfig;

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

    /// `ipc.bind_address` is not a socket address.
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
}

/// Dispatcher and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Milliseconds a handler gets to acknowledge a key event.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

/// IPC socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcConfig {
    /// Address the IPC server binds to.  Keep this on loopback.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_delivery_timeout_ms() -> u64 {
    2000
}
fn default_bind_address() -> String {
    "127.0.0.1:24900".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl AppConfig {
    /// Dispatcher settings derived from the `[service]` section.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            delivery_timeout: Duration::from_millis(self.service.delivery_timeout_ms),
        }
    }

    /// Parses `ipc.bind_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if it is not `ip:port`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.ipc
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.ipc.bind_address.clone()))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from the default location, or defaults if absent.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `devkey` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("DevKey"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("devkey"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("DevKey")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
