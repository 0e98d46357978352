//! Configuration Loader
//!
//! Merges defaults, an optional file and prefixed environment variables into a
//! validated [`TestDatabaseConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::TestDatabaseConfig;
use crate::constants::env;
use config::{Config, Environment, File};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file: None,
            env_prefix: env::CONFIG_PREFIX.to_string(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader that also reads the file named by `PG_TEST_CONFIG`, if set
    pub fn from_env() -> Self {
        let file = std::env::var(env::CONFIG_FILE)
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self {
            file,
            ..Self::default()
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Use a different variable prefix (tests use this to stay isolated)
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    /// Load, merge and validate
    pub fn load(&self) -> ConfigResult<TestDatabaseConfig> {
        let defaults = TestDatabaseConfig::default();
        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigurationError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: TestDatabaseConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            config = %serde_json::to_string(&config.sanitized())
                .unwrap_or_else(|_| "[serialization error]".to_string()),
            "Configuration loaded"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_without_sources() {
        let config = ConfigLoader::new()
            .with_env_prefix("PGTC_LOADER_UNIT_DEFAULTS")
            .load()
            .unwrap();
        assert_eq!(config.container.image, "postgres:16-alpine");
        assert_eq!(config.database.search_path.as_deref(), Some("atoms"));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = ConfigLoader::new()
            .with_file("/definitely/not/here.toml")
            .with_env_prefix("PGTC_LOADER_UNIT_MISSING")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::FileNotFound { .. }));
    }
}
