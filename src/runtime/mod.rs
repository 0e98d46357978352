//! # Container Runtime
//!
//! The capability interface the rest of the crate consumes to build, start,
//! inspect and tear down containers, plus the handle and lifecycle types that
//! travel through it.
//!
//! ```text
//! Created ──▶ Starting ──▶ Running
//!    │           │            │
//!    └───────────┴─────┬──────┘
//!                      ▼
//!                   Stopped ──▶ Disposed
//! ```
//!
//! Runtimes only perform I/O. Lifecycle transitions are recorded on the
//! [`ContainerHandle`] by its owner ([`ContainerGuard`]).

pub mod docker;
pub mod guard;

pub use docker::{DockerRuntime, DockerRuntimeOptions};
pub use guard::ContainerGuard;

use crate::config::TestDatabaseConfig;
use crate::constants::container::MANAGED_LABEL;
use crate::endpoint::{DaemonUri, PortBindings, PortKey};
use crate::error::TestDbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of a container owned by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Created,
    Starting,
    Running,
    /// Teardown was attempted; removal is not yet confirmed
    Stopped,
    Disposed,
}

impl ContainerState {
    pub fn can_transition_to(self, next: ContainerState) -> bool {
        use ContainerState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Starting, Running)
                | (Created | Starting | Running, Stopped)
                | (Created | Starting | Running | Stopped, Disposed)
        )
    }

    /// States in which a readiness probe may be pointed at the container
    pub fn is_pollable(self) -> bool {
        matches!(self, ContainerState::Starting | ContainerState::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ContainerState::Disposed)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerState::Created => "created",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Disposed => "disposed",
        };
        write!(f, "{name}")
    }
}

/// Opaque reference to one container plus its recorded lifecycle state
#[derive(Debug, PartialEq, Eq)]
pub struct ContainerHandle {
    id: String,
    name: String,
    state: ContainerState,
}

impl ContainerHandle {
    /// A freshly built container. Runtimes return this from `build`.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: ContainerState::Created,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: ContainerState) -> Result<(), TestDbError> {
        if !self.state.can_transition_to(next) {
            return Err(TestDbError::InvalidTransition {
                container: self.name.clone(),
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            container = %self.name,
            from = %self.state,
            to = %next,
            "Container state transition"
        );
        self.state = next;
        Ok(())
    }

    /// Copy referring to the same container, used to finish teardown from
    /// a detached task
    pub(crate) fn detached_copy(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
        }
    }
}

/// Named volume mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Everything a runtime needs to build a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub mounts: Vec<VolumeMount>,
    pub exposed_ports: Vec<PortKey>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(image: &str, name: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        Self {
            image: image.to_string(),
            name: name.to_string(),
            mounts: Vec::new(),
            exposed_ports: Vec::new(),
            env: BTreeMap::new(),
            labels,
        }
    }

    pub fn with_volume(mut self, source: &str, target: &str) -> Self {
        self.mounts.push(VolumeMount {
            source: source.to_string(),
            target: target.to_string(),
            read_only: false,
        });
        self
    }

    pub fn with_exposed_port(mut self, key: PortKey) -> Self {
        if !self.exposed_ports.contains(&key) {
            self.exposed_ports.push(key);
        }
        self
    }

    pub fn with_env_var(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// The PostgreSQL container described by `config`
    pub fn postgres(config: &TestDatabaseConfig) -> Self {
        let container = &config.container;
        let database = &config.database;

        let mut spec = Self::new(&container.image, &container.container_name())
            .with_exposed_port(PortKey::tcp(container.port))
            .with_env_var("POSTGRES_USER", &database.username)
            .with_env_var("POSTGRES_PASSWORD", &database.password)
            .with_env_var("POSTGRES_DB", &database.database);

        if let Some(volume) = container.volume_name() {
            spec = spec.with_volume(&volume, &container.mount_path);
        }
        spec
    }
}

/// Failures reported by a container runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Failed to pull image {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Container {0} not found")]
    NotFound(String),

    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Container runtime error: {0}")]
    Other(String),
}

/// Minimal capability interface over a container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create (but do not start) a container
    async fn build(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Stop and remove the container. Must succeed when the container is
    /// already stopped or gone.
    async fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Host-side bindings currently published for the container's ports
    async fn get_port_bindings(&self, handle: &ContainerHandle)
        -> Result<PortBindings, RuntimeError>;

    /// Where the daemon is reached, when it is a network endpoint
    fn daemon_uri(&self) -> Option<DaemonUri>;
}
