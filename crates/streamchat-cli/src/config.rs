//! CLI configuration file support
//!
//! Loads configuration from ~/.config/streamchat/config.toml

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default settings
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default configuration values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Backend base URL
    pub base_url: Option<String>,
    /// Default model
    pub model: Option<String>,
    /// Default system prompt
    pub system_prompt: Option<String>,
    /// Default sampling temperature
    pub temperature: Option<f32>,
}

impl CliConfig {
    /// Load configuration from default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("streamchat").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = CliConfig::load_from_path(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(config.default.model.is_none());
    }

    #[test]
    fn reads_defaults_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[default]\nmodel = \"gpt-4o\"\ntemperature = 0.3\nbase_url = \"http://example:9000/api/v1\""
        )
        .unwrap();

        let config = CliConfig::load_from_path(Some(file.path().to_path_buf()));
        assert_eq!(config.default.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.default.temperature, Some(0.3));
        assert_eq!(
            config.default.base_url.as_deref(),
            Some("http://example:9000/api/v1")
        );
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();

        let config = CliConfig::load_from_path(Some(file.path().to_path_buf()));
        assert!(config.default.base_url.is_none());
    }
}
