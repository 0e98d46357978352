#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # pg-test-container
//!
//! Ephemeral PostgreSQL containers for integration tests, handed out only once
//! the database has completed a real connection handshake.
//!
//! ## Overview
//!
//! A freshly started container publishes its ports before the server inside
//! is listening. Instead of sleeping for a fixed interval, the
//! [`ReadinessGate`](resilience::ReadinessGate) re-resolves the published
//! endpoint and probes it with bounded retries, telling "still starting"
//! apart from "misconfigured".
//!
//! ## Module Organization
//!
//! - [`container`] - `TestDatabase`, the top-level provision/dispose entry point
//! - [`resilience`] - Retry policy, backoff and the readiness gate
//! - [`endpoint`] - Port bindings and the endpoint resolver
//! - [`connection`] - Connection settings and target assembly
//! - [`probe`] - Readiness probes (PostgreSQL via SQLx)
//! - [`runtime`] - Container runtime interface, Docker implementation, scoped guard
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pg_test_container::{ConfigLoader, TestDatabase};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::from_env().load()?;
//! let mut db = TestDatabase::start(&config).await?;
//!
//! let pool = db.pool().await?;
//! sqlx::query("SELECT 1").execute(&pool).await?;
//!
//! db.dispose().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Setting `PG_TEST_DATABASE_URL` skips the container entirely and hands that
//! URL back unchanged.

pub mod config;
pub mod connection;
pub mod constants;
pub mod container;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod probe;
pub mod resilience;
pub mod runtime;

pub use config::{ConfigLoader, ConfigurationError, TestDatabaseConfig};
pub use connection::{ConnectionSettings, ConnectionTarget};
pub use container::TestDatabase;
pub use endpoint::{resolve, DaemonUri, HostBinding, PortBindings, PortKey};
pub use error::{Result, TestDbError};
pub use probe::{PostgresProbe, ProbeFailure, ProbeResult, ReadinessProbe};
pub use resilience::{BackoffPolicy, ReadinessError, ReadinessGate, ReadinessReport, RetryPolicy};
pub use runtime::{
    ContainerGuard, ContainerHandle, ContainerRuntime, ContainerSpec, ContainerState,
    DockerRuntime, RuntimeError,
};
