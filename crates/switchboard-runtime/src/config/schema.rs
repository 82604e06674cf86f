//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_framework::Environment;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log when each plugin scan and load begins and ends.
    #[serde(default)]
    pub spans: bool,

    /// Per-target levels, e.g. `switchboard_runtime = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            thread_ids: false,
            file_location: false,
            spans: false,
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Host environment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Root of module homes and logs.
    #[serde(default = "default_home")]
    pub home: PathBuf,

    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default = "default_encoding")]
    pub encoding: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Only the bootstrap plugin is loaded while set.
    #[serde(default)]
    pub setup_mode: bool,

    #[serde(default = "default_true")]
    pub standalone: bool,

    /// Whether the host can honour restart requests.
    #[serde(default)]
    pub restartable: bool,

    /// Version compared against a plugin's `min_server_version`.
    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            locale: default_locale(),
            encoding: default_encoding(),
            timezone: default_timezone(),
            setup_mode: false,
            standalone: true,
            restartable: false,
            version: default_server_version(),
        }
    }
}

impl ServerConfig {
    /// The container environment described by this section.
    pub fn environment(&self) -> Environment {
        Environment {
            home: self.home.clone(),
            locale: self.locale.clone(),
            encoding: self.encoding.clone(),
            timezone: self.timezone.clone(),
            setup_mode: self.setup_mode,
            standalone: self.standalone,
            restartable: self.restartable,
        }
    }
}

fn default_home() -> PathBuf {
    PathBuf::from(".")
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// =============================================================================
// Plugins
// =============================================================================

/// Plugin directory monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Watched directory. Relative paths resolve against `server.home`.
    #[serde(default = "default_plugin_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Scan interval used when `development_mode` is set.
    #[serde(default = "default_dev_scan_interval_secs")]
    pub dev_scan_interval_secs: u64,

    #[serde(default)]
    pub development_mode: bool,

    /// Loaded before anything else; the only plugin loaded in setup mode.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: String,

    /// Extra plugin directories loaded in place, e.g. from a source tree.
    #[serde(default)]
    pub dev_directories: Vec<PathBuf>,

    /// Extensions of plugin archives, without the dot.
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_dir(),
            scan_interval_secs: default_scan_interval_secs(),
            dev_scan_interval_secs: default_dev_scan_interval_secs(),
            development_mode: false,
            bootstrap: default_bootstrap(),
            dev_directories: Vec::new(),
            archive_extensions: default_archive_extensions(),
        }
    }
}

impl PluginsConfig {
    /// Delay between two scans.
    pub fn scan_interval(&self) -> Duration {
        if self.development_mode {
            Duration::from_secs(self.dev_scan_interval_secs)
        } else {
            Duration::from_secs(self.scan_interval_secs)
        }
    }
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_scan_interval_secs() -> u64 {
    20
}

fn default_dev_scan_interval_secs() -> u64 {
    5
}

fn default_bootstrap() -> String {
    "admin".to_string()
}

fn default_archive_extensions() -> Vec<String> {
    vec!["zip".to_string(), "jar".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.plugins.bootstrap, "admin");
        assert_eq!(config.plugins.scan_interval(), Duration::from_secs(20));
        assert_eq!(config.server.environment().encoding, "UTF-8");
    }

    #[test]
    fn test_development_mode_interval() {
        let plugins = PluginsConfig {
            development_mode: true,
            ..Default::default()
        };
        assert_eq!(plugins.scan_interval(), Duration::from_secs(5));
    }
}
