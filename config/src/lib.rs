//! mpsh configuration
//!
//! YAML configuration for the serial link and the interactive shell.
//!
//! # Configuration Loading Priority
//!
//! 1. Compiled-in defaults
//! 2. `/etc/mpsh/mpsh.yaml` (system-wide)
//! 3. `~/.config/mpsh/mpsh.yaml` (user)
//! 4. `./mpsh.yaml` (project-local)
//! 5. `MPSH_CONFIG=/path/to/config.yaml` (explicit)
//! 6. Environment variables (highest priority)
//!
//! # Example Configuration
//!
//! ```yaml
//! device:
//!   port: "/dev/ttyACM0"
//!   baud: 115200
//!   timeout_secs: 5
//!   chunk_size: 512
//!
//! shell:
//!   editor: "${EDITOR}"
//!   history:
//!     file: "~/.mpsh_history"
//!
//! logging:
//!   level: warn
//! ```

#![allow(missing_docs)]

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::*;

/// Load configuration from default locations.
///
/// Searches for config files in order and merges them.
/// Environment variables override file values.
pub fn load() -> Result<MpshConfig, ConfigError> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &str) -> Result<MpshConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MpshConfig::default();
        assert_eq!(config.device.port, "/dev/ttyUSB0");
        assert_eq!(config.device.baud, 115_200);
        assert_eq!(config.device.chunk_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = r#"
device:
  port: "/dev/ttyACM1"
"#;
        let config: MpshConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.device.port, "/dev/ttyACM1");
        assert_eq!(config.device.baud, 115_200); // default
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
device:
  port: "tcp:127.0.0.1:2323"
  baud: 9600
  timeout_secs: 3
  chunk_size: 1024
  soft_reset_on_connect: true

shell:
  options_file: "~/.mpsh.options"
  rc_file: "~/.mpsh.rc"
  editor: "nano"
  history:
    enabled: false

logging:
  level: debug
"#;
        let config: MpshConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.device.port, "tcp:127.0.0.1:2323");
        assert_eq!(config.device.baud, 9600);
        assert_eq!(config.device.timeout_secs, 3);
        assert_eq!(config.device.chunk_size, 1024);
        assert!(config.device.soft_reset_on_connect);
        assert_eq!(config.shell.editor.as_deref(), Some("nano"));
        assert!(!config.shell.history.enabled);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut config = MpshConfig::default();
        config.device.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }
}
