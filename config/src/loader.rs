use crate::{ConfigError, MpshConfig};
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn env_var_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").ok()).as_ref()
}

impl ConfigLoader {
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/mpsh/mpsh.yaml"));
        }
        search_paths.push(PathBuf::from("./mpsh.yaml"));

        #[cfg(unix)]
        search_paths.insert(0, PathBuf::from("/etc/mpsh/mpsh.yaml"));

        Self {
            explicit_file: None,
            search_paths,
        }
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.explicit_file = Some(PathBuf::from(path));
        self
    }

    pub fn load(&self) -> Result<MpshConfig, ConfigError> {
        let mut config = MpshConfig::default();

        if let Some(ref explicit) = self.explicit_file {
            config = self.parse_file(explicit)?;
        } else if let Ok(env_path) = std::env::var("MPSH_CONFIG") {
            config = self.parse_file(&PathBuf::from(env_path))?;
        } else {
            for path in &self.search_paths {
                if path.exists() {
                    if let Ok(content) = std::fs::read_to_string(path) {
                        tracing::debug!(path = %path.display(), "merging config file");
                        config = self.merge_yaml(&config, &content)?;
                    }
                }
            }
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn parse_file(&self, path: &PathBuf) -> Result<MpshConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        self.parse_yaml(&content)
    }

    fn parse_yaml(&self, content: &str) -> Result<MpshConfig, ConfigError> {
        let expanded = self.expand_env_vars(content);
        Ok(serde_yaml::from_str(&expanded)?)
    }

    fn merge_yaml(&self, base: &MpshConfig, content: &str) -> Result<MpshConfig, ConfigError> {
        let overlay = self.parse_yaml(content)?;
        Ok(Self::merge_configs(base, &overlay))
    }

    fn merge_configs(base: &MpshConfig, overlay: &MpshConfig) -> MpshConfig {
        let defaults = MpshConfig::default();
        let mut result = base.clone();

        if overlay.device.port != defaults.device.port {
            result.device.port.clone_from(&overlay.device.port);
        }
        if overlay.device.baud != defaults.device.baud {
            result.device.baud = overlay.device.baud;
        }
        if overlay.device.timeout_secs != defaults.device.timeout_secs {
            result.device.timeout_secs = overlay.device.timeout_secs;
        }
        if overlay.device.chunk_size != defaults.device.chunk_size {
            result.device.chunk_size = overlay.device.chunk_size;
        }
        if overlay.device.soft_reset_on_connect {
            result.device.soft_reset_on_connect = true;
        }
        if overlay.shell != defaults.shell {
            result.shell = overlay.shell.clone();
        }
        if overlay.logging.level != defaults.logging.level || !overlay.logging.filter.is_empty() {
            result.logging = overlay.logging.clone();
        }

        result
    }

    fn expand_env_vars(&self, content: &str) -> String {
        let Some(re) = env_var_pattern() else {
            return content.to_string();
        };
        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .to_string()
    }

    fn apply_env_overrides(&self, config: &mut MpshConfig) {
        if let Ok(port) = std::env::var("MPSH_PORT") {
            if !port.is_empty() {
                config.device.port = port;
            }
        }
        if let Ok(baud) = std::env::var("MPSH_BAUD") {
            if let Ok(b) = baud.parse() {
                config.device.baud = b;
            }
        }
        if let Ok(timeout) = std::env::var("MPSH_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                config.device.timeout_secs = t;
            }
        }
        if let Ok(level) = std::env::var("MPSH_LOG_LEVEL") {
            if let Ok(l) = serde_yaml::from_str(&level) {
                config.logging.level = l;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn expand_env_vars_works() {
        std::env::set_var("MPSH_TEST_VAR_123", "hello");
        let loader = ConfigLoader::new();
        let result = loader.expand_env_vars("value: ${MPSH_TEST_VAR_123}");
        assert_eq!(result, "value: hello");
        std::env::remove_var("MPSH_TEST_VAR_123");
    }

    #[test]
    fn missing_env_var_becomes_empty() {
        let loader = ConfigLoader::new();
        let result = loader.expand_env_vars("value: ${NONEXISTENT_VAR_XYZ}");
        assert_eq!(result, "value: ");
    }

    #[test]
    fn env_overrides_config() {
        std::env::set_var("MPSH_BAUD", "57600");
        let mut config = MpshConfig::default();
        let loader = ConfigLoader::new();
        loader.apply_env_overrides(&mut config);
        assert_eq!(config.device.baud, 57600);
        std::env::remove_var("MPSH_BAUD");
    }

    #[test]
    fn overlay_keeps_base_values_it_does_not_set() {
        let loader = ConfigLoader::new();
        let base = loader.parse_yaml("device:\n  port: /dev/ttyACM0\n").unwrap();
        let merged = loader.merge_yaml(&base, "device:\n  chunk_size: 512\n").unwrap();
        assert_eq!(merged.device.port, "/dev/ttyACM0");
        assert_eq!(merged.device.chunk_size, 512);
    }

    #[test]
    fn explicit_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "device:\n  timeout_secs: 2").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let config = ConfigLoader::new().with_file(&path).load().unwrap();
        assert_eq!(config.device.timeout_secs, 2);
    }

    #[test]
    fn unreadable_explicit_file_is_an_error() {
        let err = ConfigLoader::new()
            .with_file("/nonexistent/mpsh.yaml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
