//! `TenAppConfig`: process-host configuration. Not read by `ten-runtime`
//! itself — the core takes its app URI and predefined-graph descriptors as
//! constructor arguments and persists nothing on its own; this is purely
//! the example host's bootstrap config.

use serde::{Deserialize, Serialize};
use tooling::config::ConfigBuilder;
use tooling::{Result, ToolingError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenAppConfig {
    /// This process's app URI.
    pub app_uri: String,
    /// Paths to predefined-graph JSON files to register at startup.
    #[serde(default)]
    pub predefined_graph_paths: Vec<String>,
    /// Log filter passed to `tracing_subscriber`'s `EnvFilter`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for TenAppConfig {
    fn default() -> Self {
        Self {
            app_uri: "app://localhost".to_string(),
            predefined_graph_paths: Vec::new(),
            log_filter: default_log_filter(),
        }
    }
}

impl ConfigBuilder for TenAppConfig {
    fn validate(&self) -> Result<()> {
        if self.app_uri.is_empty() {
            return Err(ToolingError::General("app_uri must not be empty".to_string()));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(uri) = std::env::var(format!("{prefix}APP_URI")) {
            config.app_uri = uri;
        }
        if let Ok(filter) = std::env::var(format!("{prefix}LOG_FILTER")) {
            config.log_filter = filter;
        }
        Ok(config)
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        self.app_uri = other.app_uri;
        self.predefined_graph_paths.extend(other.predefined_graph_paths);
        self.log_filter = other.log_filter;
        self
    }
}

impl TenAppConfig {
    /// Load from `CONFIG_PATH` (TOML), falling back to in-process defaults
    /// with a logged warning if no file is present — mirrors
    /// `ServerConfig::load()`'s fallback shape.
    pub fn load() -> Self {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/ten-app.toml".to_string());
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<TenAppConfig>(&contents) {
                Ok(mut config) => {
                    if let Err(e) = config.validate() {
                        tracing::warn!(error = %e, "config file failed validation, using defaults");
                        config = Self::default();
                    }
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::warn!(path = %path, "no config file found, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(TenAppConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_app_uri_fails_validation() {
        let mut config = TenAppConfig::default();
        config.app_uri = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_env_reads_prefixed_vars() {
        std::env::set_var("TESTPFX_APP_URI", "app://from-env");
        let config = TenAppConfig::from_env("TESTPFX_").unwrap();
        assert_eq!(config.app_uri, "app://from-env");
        std::env::remove_var("TESTPFX_APP_URI");
    }
}
