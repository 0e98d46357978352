//! # Constants
//!
//! Defaults shared by the configuration layer, the Docker runtime and the
//! readiness gate. Everything here can be overridden through
//! [`TestDatabaseConfig`](crate::config::TestDatabaseConfig).

/// Environment variables consulted by the crate
pub mod env {
    /// Pre-existing connection string; when set, no container is provisioned
    pub const DATABASE_URL_OVERRIDE: &str = "PG_TEST_DATABASE_URL";

    /// Optional path to a TOML/YAML/JSON configuration file
    pub const CONFIG_FILE: &str = "PG_TEST_CONFIG";

    /// Prefix for configuration overrides (`PG_TEST_READINESS__MAX_ATTEMPTS=20`)
    pub const CONFIG_PREFIX: &str = "PG_TEST";

    /// Environment name used to pick a default log level
    pub const ENVIRONMENT: &str = "PG_TEST_ENV";

    /// `json` switches console logging to JSON lines
    pub const LOG_FORMAT: &str = "PG_TEST_LOG_FORMAT";

    /// Address of the container daemon, as understood by the docker CLI
    pub const DOCKER_HOST: &str = "DOCKER_HOST";
}

/// Container defaults
pub mod container {
    pub const DEFAULT_IMAGE: &str = "postgres:16-alpine";
    pub const DEFAULT_NAME: &str = "pg-test-container";
    pub const DEFAULT_VOLUME: &str = "pg-test-container-data";
    pub const DEFAULT_MOUNT_PATH: &str = "/var/lib/postgresql/data";
    pub const POSTGRES_PORT: u16 = 5432;
    pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

    /// Label applied to every container this crate creates
    pub const MANAGED_LABEL: &str = "pg-test-container.managed";
}

/// Database credential defaults
pub mod database {
    pub const DEFAULT_USERNAME: &str = "postgres";
    pub const DEFAULT_PASSWORD: &str = "hunter2";
    pub const DEFAULT_DATABASE: &str = "postgres";
    pub const DEFAULT_SEARCH_PATH: &str = "atoms";
}

/// Readiness polling defaults
pub mod readiness {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_BACKOFF_MS: u64 = 500;
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
}

/// SQLSTATE codes the Postgres probe treats as "still starting"
pub mod sqlstate {
    pub const CANNOT_CONNECT_NOW: &str = "57P03";
    pub const ADMIN_SHUTDOWN: &str = "57P01";
    pub const TOO_MANY_CONNECTIONS: &str = "53300";
    pub const CONNECTION_EXCEPTION_CLASS: &str = "08";
    pub const INVALID_PASSWORD: &str = "28P01";
    pub const INVALID_AUTHORIZATION: &str = "28000";
}
