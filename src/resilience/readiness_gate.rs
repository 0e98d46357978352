//! # Readiness Gate
//!
//! Blocks container start-up until the service inside accepts a real
//! protocol-level connection.
//!
//! Each attempt re-reads the runtime's port bindings, resolves a fresh
//! [`ConnectionTarget`] and hands it to the probe:
//!
//! | probe outcome          | attempts left | gate action                        |
//! |------------------------|---------------|------------------------------------|
//! | success                | any           | return [`ReadinessReport`]         |
//! | transient / no binding | yes           | sleep the backoff, try again       |
//! | transient / no binding | no            | [`ReadinessError::Timeout`]        |
//! | fatal                  | any           | [`ReadinessError::Configuration`]  |
//!
//! Cancellation and the optional deadline are checked before every attempt,
//! and the backoff sleep wakes early on either of them.

use super::backoff::{RetryPolicy, RetryState};
use super::errors::ReadinessError;
use crate::connection::{ConnectionSettings, ConnectionTarget};
use crate::endpoint::{resolve, PortKey};
use crate::logging::log_probe_attempt;
use crate::probe::{ProbeFailure, ProbeResult, ReadinessProbe};
use crate::runtime::{ContainerHandle, ContainerRuntime};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What a successful readiness check observed
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessReport {
    /// Probe attempts made, the successful one included
    pub attempts: u32,
    /// Total time spent sleeping between attempts
    pub backoff: Duration,
    /// Target the successful handshake was made against
    pub target: ConnectionTarget,
}

#[derive(Debug, Clone)]
pub struct ReadinessGate {
    policy: RetryPolicy,
    port: PortKey,
    settings: ConnectionSettings,
    cancel: CancellationToken,
    deadline: Option<Duration>,
}

impl ReadinessGate {
    pub fn new(policy: RetryPolicy, port: PortKey, settings: ConnectionSettings) -> Self {
        Self {
            policy,
            port,
            settings,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Stop polling when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Give up once `deadline` has elapsed since polling started
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn port(&self) -> PortKey {
        self.port
    }

    /// Poll until `probe` completes a handshake against `handle`'s published
    /// endpoint, the attempts run out, or polling is cancelled.
    pub async fn await_ready<R, P>(
        &self,
        runtime: &R,
        handle: &ContainerHandle,
        probe: &P,
    ) -> Result<ReadinessReport, ReadinessError>
    where
        R: ContainerRuntime + ?Sized,
        P: ReadinessProbe + ?Sized,
    {
        if !handle.state().is_pollable() {
            return Err(ReadinessError::InvalidState {
                container: handle.name().to_string(),
                state: handle.state(),
            });
        }

        let started = Instant::now();
        let deadline_at = self.deadline.map(|deadline| started + deadline);
        let mut retry = RetryState::new(self.policy.max_attempts());
        let mut last_target: Option<ConnectionTarget> = None;
        let mut backoff_total = Duration::ZERO;

        info!(
            container = %handle.name(),
            port = %self.port,
            max_attempts = self.policy.max_attempts(),
            "⏳ Waiting for database readiness"
        );

        loop {
            if self.cancel.is_cancelled() {
                warn!(
                    container = %handle.name(),
                    attempts = retry.attempts(),
                    "Readiness check cancelled"
                );
                return Err(ReadinessError::Cancelled {
                    attempts: retry.attempts(),
                    last_target,
                });
            }
            if let (Some(deadline), Some(at)) = (self.deadline, deadline_at) {
                if Instant::now() >= at {
                    warn!(
                        container = %handle.name(),
                        attempts = retry.attempts(),
                        "Readiness deadline exceeded"
                    );
                    return Err(ReadinessError::DeadlineExceeded {
                        attempts: retry.attempts(),
                        deadline,
                        last_target,
                    });
                }
            }

            let attempt = retry.begin_attempt();

            let cause = match self.current_target(runtime, handle).await {
                TargetResolution::Ready(target) => {
                    let outcome = probe.try_connect(&target).await;
                    log_probe_attempt(
                        handle.name(),
                        attempt,
                        retry.max_attempts(),
                        Some(&target.to_string()),
                        outcome.label(),
                        failure_reason(&outcome),
                    );
                    match outcome {
                        ProbeResult::Success => {
                            info!(
                                container = %handle.name(),
                                attempts = attempt,
                                target = %target,
                                "✅ Database is accepting connections"
                            );
                            return Ok(ReadinessReport {
                                attempts: attempt,
                                backoff: backoff_total,
                                target,
                            });
                        }
                        ProbeResult::FatalFailure(cause) => {
                            return Err(ReadinessError::Configuration {
                                attempt,
                                target: Some(target),
                                cause,
                            });
                        }
                        ProbeResult::TransientFailure(cause) => {
                            last_target = Some(target);
                            cause
                        }
                    }
                }
                TargetResolution::Unavailable(cause) => {
                    log_probe_attempt(
                        handle.name(),
                        attempt,
                        retry.max_attempts(),
                        None,
                        "binding_unavailable",
                        Some(cause.reason()),
                    );
                    cause
                }
                TargetResolution::Invalid(cause) => {
                    // Settings that cannot form a URL never will
                    return Err(ReadinessError::Configuration {
                        attempt,
                        target: None,
                        cause,
                    });
                }
            };

            if retry.is_exhausted() {
                warn!(
                    container = %handle.name(),
                    attempts = attempt,
                    cause = %cause,
                    "❌ Readiness attempts exhausted"
                );
                return Err(ReadinessError::Timeout {
                    attempts: attempt,
                    elapsed: started.elapsed(),
                    last_target,
                    cause,
                });
            }

            let delay = self.policy.backoff().delay_for(attempt);
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    warn!(
                        container = %handle.name(),
                        attempts = attempt,
                        "Readiness check cancelled during backoff"
                    );
                    return Err(ReadinessError::Cancelled {
                        attempts: attempt,
                        last_target,
                    });
                }
                _ = sleep_until_deadline(deadline_at) => {
                    warn!(
                        container = %handle.name(),
                        attempts = attempt,
                        "Readiness deadline exceeded during backoff"
                    );
                    return Err(ReadinessError::DeadlineExceeded {
                        attempts: attempt,
                        deadline: self.deadline.unwrap_or_default(),
                        last_target,
                    });
                }
                _ = tokio::time::sleep(delay) => {
                    backoff_total += delay;
                }
            }
        }
    }

    /// Resolve the target for this attempt from freshly read bindings
    async fn current_target<R>(&self, runtime: &R, handle: &ContainerHandle) -> TargetResolution
    where
        R: ContainerRuntime + ?Sized,
    {
        let bindings = match runtime.get_port_bindings(handle).await {
            Ok(bindings) => bindings,
            Err(e) => {
                return TargetResolution::Unavailable(ProbeFailure::new(format!(
                    "port bindings unavailable: {e}"
                )))
            }
        };

        let daemon_uri = runtime.daemon_uri();
        let Some(endpoint) = resolve(&bindings, self.port, daemon_uri.as_ref()) else {
            return TargetResolution::Unavailable(ProbeFailure::new(format!(
                "no published binding for {}",
                self.port
            )));
        };

        match ConnectionTarget::new(endpoint, &self.settings) {
            Ok(target) => TargetResolution::Ready(target),
            Err(e) => TargetResolution::Invalid(ProbeFailure::new(format!(
                "invalid connection target: {e}"
            ))),
        }
    }
}

enum TargetResolution {
    Ready(ConnectionTarget),
    /// Not published yet, retried like a transient probe failure
    Unavailable(ProbeFailure),
    Invalid(ProbeFailure),
}

/// Completes at `at`, or never when there is no deadline
async fn sleep_until_deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn failure_reason(outcome: &ProbeResult) -> Option<&str> {
    match outcome {
        ProbeResult::Success => None,
        ProbeResult::TransientFailure(f) | ProbeResult::FatalFailure(f) => Some(f.reason()),
    }
}
