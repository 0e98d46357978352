//! # Test Database
//!
//! Top-level entry point: either adopt a database named by the override
//! environment variable, or provision a PostgreSQL container, wait for it to
//! accept connections and hand back its connection string.
//!
//! The connection string is computed once, during provisioning, and stored
//! on the returned [`TestDatabase`].

use crate::config::TestDatabaseConfig;
use crate::connection::ConnectionTarget;
use crate::endpoint::PortKey;
use crate::error::Result;
use crate::logging::{log_container_operation, log_error};
use crate::probe::{PostgresProbe, ReadinessProbe};
use crate::resilience::ReadinessGate;
use crate::runtime::{
    ContainerGuard, ContainerRuntime, ContainerSpec, DockerRuntime, DockerRuntimeOptions,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Where the database behind a [`TestDatabase`] came from
#[derive(Debug)]
enum DatabaseSource {
    /// Supplied through the override environment variable; nothing to tear down
    External,
    Container {
        guard: ContainerGuard,
        target: ConnectionTarget,
    },
}

#[derive(Debug)]
pub struct TestDatabase {
    connection_string: String,
    source: DatabaseSource,
}

impl TestDatabase {
    /// Provision against the local Docker daemon with the default Postgres probe.
    ///
    /// The override variable is consulted before the daemon is contacted, so
    /// an overridden run never needs Docker.
    pub async fn start(config: &TestDatabaseConfig) -> Result<Self> {
        Self::start_cancellable(config, CancellationToken::new()).await
    }

    /// [`start`](Self::start), giving up early once `cancel` fires
    pub async fn start_cancellable(
        config: &TestDatabaseConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(url) = override_url(&config.override_env_var) {
            return Ok(Self::external(&config.override_env_var, url));
        }

        let runtime = DockerRuntime::connect(DockerRuntimeOptions::from(&config.container)).await?;
        let probe = PostgresProbe::new(config.readiness.connect_timeout());
        Self::provision_container(config, Arc::new(runtime), &probe, cancel).await
    }

    /// Provision a database using the given runtime and probe.
    ///
    /// When the override variable holds a non-empty value the runtime and
    /// probe are never touched. Otherwise the container is owned from the
    /// moment `build` returns and is disposed on every failure path.
    pub async fn provision(
        config: &TestDatabaseConfig,
        runtime: Arc<dyn ContainerRuntime>,
        probe: &dyn ReadinessProbe,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(url) = override_url(&config.override_env_var) {
            return Ok(Self::external(&config.override_env_var, url));
        }
        Self::provision_container(config, runtime, probe, cancel).await
    }

    fn external(variable: &str, url: String) -> Self {
        info!(variable = %variable, "Using externally provided database, skipping container");
        Self {
            connection_string: url,
            source: DatabaseSource::External,
        }
    }

    async fn provision_container(
        config: &TestDatabaseConfig,
        runtime: Arc<dyn ContainerRuntime>,
        probe: &dyn ReadinessProbe,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let gate = ReadinessGate::new(
            config.readiness.retry_policy()?,
            PortKey::tcp(config.container.port),
            config.database.clone(),
        )
        .with_cancellation(cancel)
        .with_deadline(config.readiness.deadline());

        let spec = ContainerSpec::postgres(config);
        let mut guard = ContainerGuard::build(runtime, &spec).await?;

        match bring_up(&mut guard, &gate, config, probe).await {
            Ok(target) => {
                log_container_operation(
                    "provision",
                    guard.handle().name(),
                    Some(guard.handle().id()),
                    "ready",
                    Some(&target.to_string()),
                );
                Ok(Self {
                    connection_string: target.connection_string().to_string(),
                    source: DatabaseSource::Container { guard, target },
                })
            }
            Err(e) => {
                if let Err(dispose_err) = guard.dispose().await {
                    log_error(
                        "test_database",
                        "dispose_after_failure",
                        &dispose_err.to_string(),
                        Some(guard.handle().name()),
                    );
                }
                Err(e)
            }
        }
    }

    /// The connection string computed during provisioning
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn is_external(&self) -> bool {
        matches!(self.source, DatabaseSource::External)
    }

    /// Guard for the provisioned container; `None` for an external database
    pub fn container(&self) -> Option<&ContainerGuard> {
        match &self.source {
            DatabaseSource::External => None,
            DatabaseSource::Container { guard, .. } => Some(guard),
        }
    }

    /// Target confirmed by the readiness gate; `None` for an external database
    pub fn target(&self) -> Option<&ConnectionTarget> {
        match &self.source {
            DatabaseSource::External => None,
            DatabaseSource::Container { target, .. } => Some(target),
        }
    }

    /// Open a connection pool against the database
    pub async fn pool(&self) -> Result<PgPool> {
        Ok(PgPool::connect(&self.connection_string).await?)
    }

    /// Tear down the container, if one was provisioned. Idempotent.
    pub async fn dispose(&mut self) -> Result<()> {
        match &mut self.source {
            DatabaseSource::External => Ok(()),
            DatabaseSource::Container { guard, .. } => guard.dispose().await,
        }
    }
}

async fn bring_up(
    guard: &mut ContainerGuard,
    gate: &ReadinessGate,
    config: &TestDatabaseConfig,
    probe: &dyn ReadinessProbe,
) -> Result<ConnectionTarget> {
    guard.start().await?;
    gate.await_ready(guard.runtime(), guard.handle(), probe).await?;
    guard.mark_running()?;
    guard
        .connection_target(gate.port(), &config.database)
        .await
}

/// Value of the override variable, if it holds anything
fn override_url(variable: &str) -> Option<String> {
    if variable.is_empty() {
        return None;
    }
    std::env::var(variable)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
