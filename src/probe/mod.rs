//! # Readiness Probes
//!
//! A probe makes one real connection attempt against a [`ConnectionTarget`]
//! and reports whether the service answered, is still coming up, or can never
//! succeed with the current configuration.

pub mod postgres;

pub use postgres::{classify_connect_error, PostgresProbe};

use crate::connection::ConnectionTarget;
use async_trait::async_trait;
use std::fmt;

/// Why a probe attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    reason: String,
}

impl ProbeFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn from_error(error: &dyn std::error::Error) -> Self {
        Self::new(error.to_string())
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Outcome of a single probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// A real handshake completed
    Success,
    /// Worth retrying: the service may not be listening yet
    TransientFailure(ProbeFailure),
    /// Retrying cannot help: credentials, protocol or configuration are wrong
    FatalFailure(ProbeFailure),
}

impl ProbeResult {
    pub fn transient(reason: impl Into<String>) -> Self {
        ProbeResult::TransientFailure(ProbeFailure::new(reason))
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        ProbeResult::FatalFailure(ProbeFailure::new(reason))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeResult::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeResult::Success => "success",
            ProbeResult::TransientFailure(_) => "transient_failure",
            ProbeResult::FatalFailure(_) => "fatal_failure",
        }
    }
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn try_connect(&self, target: &ConnectionTarget) -> ProbeResult;
}
