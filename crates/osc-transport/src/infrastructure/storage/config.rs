//! TOML-based configuration persistence.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\OSCWidgets\config.toml`
//! - Linux:    `~/.config/oscwidgets/config.toml`
//! - macOS:    `~/Library/Application Support/OSCWidgets/config.toml`
//!
//! Example:
//!
//! ```toml
//! [network]
//! mode = "tcp"
//! ip = "10.101.100.101"
//! tcp_port = 3032
//! frame_mode = "slip"
//!
//! [log_file]
//! file_depth = 500
//! ```
//!
//! Every field has a `#[serde(default = "...")]` helper, so a missing file, a
//! missing section or a missing key all fall back to the values below.

use std::path::{Path, PathBuf};

use osc_core::FrameMode;
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

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub app: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub log_file: LogFileConfig,
}

/// Which set of workers a session runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// One UDP sender plus one UDP listener.
    #[default]
    Udp,
    /// One framed TCP client connection.
    Tcp,
}

/// General behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Lines kept in the in-memory log view.
    #[serde(default = "default_log_depth")]
    pub log_depth: usize,
    /// Interval of the owner's poll loop.
    #[serde(default = "default_ui_refresh_ms")]
    pub ui_refresh_ms: u64,
}

/// Target addresses and transport selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default)]
    pub mode: TransportMode,
    /// Remote host for UDP output and the TCP connection.
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_udp_output_port")]
    pub udp_output_port: u16,
    #[serde(default = "default_udp_input_port")]
    pub udp_input_port: u16,
    /// Local address the UDP listener binds.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_udp_input_ip")]
    pub udp_input_ip: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_frame_mode")]
    pub frame_mode: FrameMode,
}

/// Worker delays and timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Capped log file written by the log sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogFileConfig {
    /// Defaults to `log.txt` next to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Most recent lines kept in the file.  `0` disables the file.
    #[serde(default = "default_file_depth")]
    pub file_depth: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_depth() -> usize {
    200
}
fn default_ui_refresh_ms() -> u64 {
    50
}
fn default_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_udp_output_port() -> u16 {
    8000
}
fn default_udp_input_port() -> u16 {
    8001
}
fn default_udp_input_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_tcp_port() -> u16 {
    3032
}
fn default_frame_mode() -> FrameMode {
    FrameMode::Slip
}
fn default_reconnect_delay_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_recv_timeout_ms() -> u64 {
    100
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_idle_sleep_ms() -> u64 {
    1
}
fn default_write_timeout_ms() -> u64 {
    1000
}
fn default_file_depth() -> usize {
    1000
}
fn default_flush_interval_ms() -> u64 {
    1000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_depth: default_log_depth(),
            ui_refresh_ms: default_ui_refresh_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            ip: default_ip(),
            udp_output_port: default_udp_output_port(),
            udp_input_port: default_udp_input_port(),
            udp_input_ip: default_udp_input_ip(),
            tcp_port: default_tcp_port(),
            frame_mode: default_frame_mode(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_sleep_ms: default_idle_sleep_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            path: None,
            file_depth: default_file_depth(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl LogFileConfig {
    /// The configured path, or `log.txt` in the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPlatformConfigDir`] when no path is configured
    /// and the platform directory cannot be determined.
    pub fn resolved_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("log.txt")),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, with the same "missing means default"
/// behaviour as [`load_config`].
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

/// Persists `config` to the platform config file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
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

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("OSCWidgets"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("oscwidgets"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("OSCWidgets")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
