use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MpshConfig {
    pub device: DeviceConfig,
    pub shell: ShellConfig,
    pub logging: LoggingConfig,
}

impl MpshConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.port.trim().is_empty() {
            return Err(ConfigError::InvalidValue("device.port is empty".into()));
        }
        if self.device.chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "device.chunk_size must be positive".into(),
            ));
        }
        if self.device.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "device.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial device path, or `tcp:HOST:PORT` for a socket transport.
    pub port: String,
    pub baud: u32,
    /// Upper bound on any single wait for device output.
    pub timeout_secs: u64,
    /// Bytes moved per read/write snippet during transfers.
    pub chunk_size: usize,
    pub soft_reset_on_connect: bool,
}

impl DeviceConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            timeout_secs: 10,
            chunk_size: 256,
            soft_reset_on_connect: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Where `set` and `alias` persist their state.
    pub options_file: String,
    /// Command file replayed after the options file at startup.
    pub rc_file: String,
    /// Editor for `edit`; falls back to `$EDITOR`, then `vi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    pub history: HistoryConfig,
}

impl ShellConfig {
    pub fn options_path(&self) -> PathBuf {
        expand_path(&self.options_file)
    }

    pub fn rc_path(&self) -> PathBuf {
        expand_path(&self.rc_file)
    }

    pub fn editor(&self) -> String {
        self.editor
            .clone()
            .filter(|e| !e.is_empty())
            .or_else(|| std::env::var("EDITOR").ok().filter(|e| !e.is_empty()))
            .unwrap_or_else(|| "vi".to_string())
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            options_file: "~/.mpsh.options".to_string(),
            rc_file: "~/.mpsh.rc".to_string(),
            editor: None,
            history: HistoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub file: String,
    pub max_entries: usize,
}

impl HistoryConfig {
    pub fn path(&self) -> PathBuf {
        expand_path(&self.file)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: "~/.mpsh_history".to_string(),
            max_entries: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            filter: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_paths_expand_to_home() {
        let shell = ShellConfig::default();
        let options = shell.options_path();
        assert!(!options.to_string_lossy().starts_with('~'));
        assert!(options.ends_with(".mpsh.options"));
    }

    #[test]
    fn configured_editor_wins() {
        let shell = ShellConfig {
            editor: Some("nano".into()),
            ..ShellConfig::default()
        };
        assert_eq!(shell.editor(), "nano");
    }

    #[test]
    fn timeout_as_duration() {
        let device = DeviceConfig {
            timeout_secs: 4,
            ..DeviceConfig::default()
        };
        assert_eq!(device.timeout(), Duration::from_secs(4));
    }
}
