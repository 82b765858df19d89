//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$SHEETMAIL_CONFIG` (environment variable)
//! 2. `~/.config/sheetmail/config.toml` (Linux/macOS)
//!    `%APPDATA%\sheetmail\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// HTTP service and working directory.
    pub server: ServerConfig,
    /// Mail store and relay endpoints.
    pub mail: MailConfig,
    /// Attachment filter used when the client does not send one.
    pub scan: ScanConfig,
    /// Defaults for emailing a processed spreadsheet.
    pub outbound: OutboundConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Directory for `sheetmail.log`. Defaults to the cache directory.
    pub log_dir: Option<PathBuf>,
    /// Override the cache directory (logs, default working directory).
    pub cache_dir: Option<PathBuf>,
}

/// HTTP service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Working directory for fetched and processed spreadsheets.
    pub work_dir: Option<PathBuf>,
    /// Working files older than this are removed by the sweep.
    pub file_max_age_secs: u64,
    /// How often the sweep runs.
    pub sweep_interval_secs: u64,
}

/// Mail endpoints. Per-request credentials may override the IMAP host and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    /// Folder scanned for unread work orders.
    pub folder: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Connect/login timeout. Unset means the transport's own default.
    pub timeout_secs: Option<u64>,
    /// Accept self-signed certificates (test servers only).
    pub accept_invalid_certs: bool,
}

/// Attachment filter defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Case-insensitive filename prefix of work-order spreadsheets.
    pub filename_prefix: String,
    /// Recognized spreadsheet extensions, with or without the leading dot.
    pub extensions: Vec<String>,
}

/// Defaults for the send step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Recipient used when the request names none.
    pub default_recipient: Option<String>,
    pub default_subject: String,
    pub default_body: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
            cache_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            work_dir: None,
            file_max_age_secs: 60 * 60,
            sweep_interval_secs: 10 * 60,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            imap_host: "imap.gmail.com".to_string(),
            imap_port: 993,
            folder: "INBOX".to_string(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            timeout_secs: None,
            accept_invalid_certs: false,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            filename_prefix: "WS-".to_string(),
            extensions: vec![".xls".to_string(), ".xlsx".to_string(), ".xlsm".to_string()],
        }
    }
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            default_recipient: None,
            default_subject: "Intervention report".to_string(),
            default_body: "Please find the completed intervention sheet attached.".to_string(),
        }
    }
}

impl MailConfig {
    /// The configured timeout as a `Duration`, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl ServerConfig {
    pub fn file_max_age(&self) -> Duration {
        Duration::from_secs(self.file_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("SHEETMAIL_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("sheetmail").join("config.toml"))
}

/// Return the cache directory for logs and the default working directory.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sheetmail")
}

/// Return the directory that receives `sheetmail.log`.
pub fn log_dir(config: &Config) -> PathBuf {
    config
        .general
        .log_dir
        .clone()
        .unwrap_or_else(|| cache_dir(config))
}

/// Return the working directory for spreadsheets in flight.
pub fn work_dir(config: &Config) -> PathBuf {
    config
        .server
        .work_dir
        .clone()
        .unwrap_or_else(|| cache_dir(config).join("work"))
}
