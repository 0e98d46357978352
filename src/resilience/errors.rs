//! Errors that cross the readiness gate boundary.
//!
//! Transient probe failures never appear here on their own. They surface only
//! as the `cause` of a [`ReadinessError::Timeout`] once attempts run out.

use crate::connection::ConnectionTarget;
use crate::probe::ProbeFailure;
use crate::runtime::ContainerState;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadinessError {
    /// The probe classified a failure as one retrying cannot fix
    #[error(
        "Configuration error on attempt {attempt} against {}: {cause}",
        describe_target(.target.as_ref())
    )]
    Configuration {
        attempt: u32,
        target: Option<ConnectionTarget>,
        cause: ProbeFailure,
    },

    /// Every allowed attempt failed transiently
    #[error(
        "Timeout waiting for database at {} after {attempts} attempts ({}ms): {cause}",
        describe_target(.last_target.as_ref()),
        .elapsed.as_millis()
    )]
    Timeout {
        attempts: u32,
        elapsed: Duration,
        last_target: Option<ConnectionTarget>,
        cause: ProbeFailure,
    },

    #[error(
        "Readiness check cancelled after {attempts} attempts (last target: {})",
        describe_target(.last_target.as_ref())
    )]
    Cancelled {
        attempts: u32,
        last_target: Option<ConnectionTarget>,
    },

    #[error(
        "Readiness deadline of {}ms exceeded after {attempts} attempts (last target: {})",
        .deadline.as_millis(),
        describe_target(.last_target.as_ref())
    )]
    DeadlineExceeded {
        attempts: u32,
        deadline: Duration,
        last_target: Option<ConnectionTarget>,
    },

    #[error("Container {container} is {state}; readiness polling requires a started container")]
    InvalidState {
        container: String,
        state: ContainerState,
    },

    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl ReadinessError {
    /// Attempts performed before this error was raised
    pub fn attempts(&self) -> u32 {
        match self {
            ReadinessError::Configuration { attempt, .. } => *attempt,
            ReadinessError::Timeout { attempts, .. }
            | ReadinessError::Cancelled { attempts, .. }
            | ReadinessError::DeadlineExceeded { attempts, .. } => *attempts,
            ReadinessError::InvalidState { .. } | ReadinessError::InvalidPolicy(_) => 0,
        }
    }

    /// Last target a probe was pointed at, if any binding was ever published
    pub fn last_target(&self) -> Option<&ConnectionTarget> {
        match self {
            ReadinessError::Configuration { target, .. } => target.as_ref(),
            ReadinessError::Timeout { last_target, .. }
            | ReadinessError::Cancelled { last_target, .. }
            | ReadinessError::DeadlineExceeded { last_target, .. } => last_target.as_ref(),
            ReadinessError::InvalidState { .. } | ReadinessError::InvalidPolicy(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadinessError::Timeout { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ReadinessError::Configuration { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReadinessError::Cancelled { .. })
    }
}

fn describe_target(target: Option<&ConnectionTarget>) -> String {
    match target {
        Some(target) => format!("\"{target}\""),
        None => "<no published port binding>".to_string(),
    }
}
