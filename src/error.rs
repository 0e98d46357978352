//! Crate-level error type.

use crate::config::ConfigurationError;
use crate::endpoint::PortKey;
use crate::resilience::ReadinessError;
use crate::runtime::{ContainerState, RuntimeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestDbError {
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid container state transition for {container}: {from} -> {to}")]
    InvalidTransition {
        container: String,
        from: ContainerState,
        to: ContainerState,
    },

    #[error("Container {container} is {state}; a connection target requires a running container")]
    NotRunning {
        container: String,
        state: ContainerState,
    },

    #[error("Container {container} has no published binding for {key}")]
    BindingUnavailable { container: String, key: PortKey },

    #[error("Invalid connection target: {0}")]
    InvalidTarget(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, TestDbError>;
