//! # Configuration
//!
//! Layered configuration for provisioning a test database.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults ([`TestDatabaseConfig::default`])
//! 2. An optional file: TOML, YAML or JSON, chosen by extension
//! 3. Environment variables prefixed `PG_TEST_`, with `__` between nesting
//!    levels (`PG_TEST_READINESS__MAX_ATTEMPTS=20`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pg_test_container::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::from_env().load()?;
//! println!("image: {}", config.container.image);
//! println!("attempts: {}", config.readiness.max_attempts);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

use crate::connection::ConnectionSettings;
use crate::constants::{container, env, readiness};
use crate::resilience::{BackoffPolicy, ReadinessError, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TestDatabaseConfig {
    /// Container image, naming and lifecycle settings
    pub container: ContainerConfig,

    /// Credentials and session parameters baked into the connection string
    pub database: ConnectionSettings,

    /// Readiness polling bounds
    pub readiness: ReadinessConfig,

    /// Variable that, when set, bypasses provisioning entirely
    pub override_env_var: String,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            container: ContainerConfig::default(),
            database: ConnectionSettings::default(),
            readiness: ReadinessConfig::default(),
            override_env_var: env::DATABASE_URL_OVERRIDE.to_string(),
        }
    }
}

/// Container image, naming and lifecycle settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub image: String,
    pub name: String,
    /// Append a per-session suffix to the container (and volume) name
    pub unique_name: bool,
    /// Named volume for the data directory; `None` keeps data in the container
    pub volume: Option<String>,
    pub mount_path: String,
    /// Port the database listens on inside the container
    pub port: u16,
    /// Remove a leftover container holding the same name before creating
    pub replace_stale: bool,
    pub pull_missing: bool,
    pub stop_timeout_secs: u64,
    #[serde(skip, default = "session_suffix")]
    session_suffix: String,
}

fn session_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: container::DEFAULT_IMAGE.to_string(),
            name: container::DEFAULT_NAME.to_string(),
            unique_name: false,
            volume: Some(container::DEFAULT_VOLUME.to_string()),
            mount_path: container::DEFAULT_MOUNT_PATH.to_string(),
            port: container::POSTGRES_PORT,
            replace_stale: true,
            pull_missing: true,
            stop_timeout_secs: container::DEFAULT_STOP_TIMEOUT_SECS,
            session_suffix: session_suffix(),
        }
    }
}

impl ContainerConfig {
    /// Container name, suffixed per session when `unique_name` is set
    pub fn container_name(&self) -> String {
        if self.unique_name {
            format!("{}-{}", self.name, self.session_suffix)
        } else {
            self.name.clone()
        }
    }

    /// Volume name, suffixed alongside the container name so concurrent
    /// sessions never share a data directory
    pub fn volume_name(&self) -> Option<String> {
        self.volume.as_ref().map(|volume| {
            if self.unique_name {
                format!("{}-{}", volume, self.session_suffix)
            } else {
                volume.clone()
            }
        })
    }
}

/// Readiness polling bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Total probe attempts, including the first
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Upper bound for a single connection attempt
    pub connect_timeout_ms: u64,
    /// Overall wall-clock bound across all attempts
    pub deadline_ms: Option<u64>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: readiness::DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            connect_timeout_ms: readiness::DEFAULT_CONNECT_TIMEOUT_MS,
            deadline_ms: None,
        }
    }
}

impl ReadinessConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy, ReadinessError> {
        RetryPolicy::new(self.max_attempts, self.backoff.clone())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

impl TestDatabaseConfig {
    /// Validate the loaded configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let container = &self.container;
        if container.image.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("image", "container"));
        }
        if !is_valid_container_name(&container.name) {
            return Err(ConfigurationError::invalid_value(
                "container.name",
                container.name.clone(),
                "must start with an alphanumeric character and contain only [a-zA-Z0-9_.-]",
            ));
        }
        if container.port == 0 {
            return Err(ConfigurationError::invalid_value(
                "container.port",
                "0",
                "must be a non-zero port",
            ));
        }
        if container.volume.is_some() && container.mount_path.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "mount_path",
                "container (required when a volume is configured)",
            ));
        }

        if self.database.username.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("username", "database"));
        }
        if self.database.database.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("database", "database"));
        }

        if self.readiness.connect_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "readiness.connect_timeout_ms",
                "0",
                "must be positive",
            ));
        }
        self.readiness.retry_policy().map_err(|e| {
            ConfigurationError::invalid_value(
                "readiness",
                format!("max_attempts={}", self.readiness.max_attempts),
                e.to_string(),
            )
        })?;

        if self.override_env_var.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "override_env_var",
                "root",
            ));
        }

        Ok(())
    }

    /// Copy safe to log: the password is masked
    pub fn sanitized(&self) -> Self {
        Self {
            database: self.database.sanitized(),
            ..self.clone()
        }
    }
}

fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TestDatabaseConfig::default();
        config.validate().unwrap();
        assert_eq!(config.override_env_var, env::DATABASE_URL_OVERRIDE);
        assert_eq!(config.readiness.max_attempts, 10);
        assert_eq!(config.readiness.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.readiness.deadline(), None);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = TestDatabaseConfig::default();
        config.readiness.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_container_name_rejected() {
        let mut config = TestDatabaseConfig::default();
        config.container.name = "-bad name".to_string();
        assert!(config.validate().is_err());

        config.container.name = "Hangfire.Atoms.Tests_1".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_image_and_username_rejected() {
        let mut config = TestDatabaseConfig::default();
        config.container.image = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));

        let mut config = TestDatabaseConfig::default();
        config.database.username.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unique_name_suffixes_container_and_volume() {
        let mut container = ContainerConfig::default();
        assert_eq!(container.container_name(), "pg-test-container");

        container.unique_name = true;
        let name = container.container_name();
        assert!(name.starts_with("pg-test-container-"));
        assert_eq!(name.len(), "pg-test-container-".len() + 8);
        assert_eq!(name, container.container_name(), "suffix must be stable");

        let volume = container.volume_name().unwrap();
        assert!(volume.starts_with("pg-test-container-data-"));
        assert!(volume.ends_with(&name[name.len() - 8..]));
    }

    #[test]
    fn test_sanitized_masks_password() {
        let config = TestDatabaseConfig::default().sanitized();
        assert_eq!(config.database.password, "***");
        assert_eq!(config.container.image, "postgres:16-alpine");
    }
}
