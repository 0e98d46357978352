//! Backoff and retry bounds for readiness polling.

use super::errors::ReadinessError;
use crate::constants::readiness;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay inserted between probe attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay after every failed attempt
    Fixed { delay_ms: u64 },
    /// `initial_ms * multiplier^(attempt - 1)`, capped at `max_ms`
    Exponential {
        initial_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed {
            delay_ms: readiness::DEFAULT_BACKOFF_MS,
        }
    }
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        BackoffPolicy::Fixed {
            delay_ms: duration_ms(delay),
        }
    }

    pub fn exponential(initial: Duration, multiplier: f64, max: Duration) -> Self {
        BackoffPolicy::Exponential {
            initial_ms: duration_ms(initial),
            multiplier,
            max_ms: duration_ms(max),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            BackoffPolicy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            BackoffPolicy::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
                let scaled = initial_ms as f64 * multiplier.powi(exponent);
                let capped = if scaled.is_finite() {
                    scaled.min(max_ms as f64)
                } else {
                    max_ms as f64
                };
                Duration::from_millis(capped as u64)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ReadinessError> {
        match *self {
            BackoffPolicy::Fixed { .. } => Ok(()),
            BackoffPolicy::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                if !(multiplier.is_finite() && multiplier >= 1.0) {
                    return Err(ReadinessError::InvalidPolicy(format!(
                        "backoff multiplier must be >= 1.0, got {multiplier}"
                    )));
                }
                if max_ms < initial_ms {
                    return Err(ReadinessError::InvalidPolicy(format!(
                        "max backoff {max_ms}ms is below the initial {initial_ms}ms"
                    )));
                }
                Ok(())
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// How many attempts to make and how long to wait between them.
///
/// `max_attempts` counts probe invocations, the first one included: a policy
/// of `N` probes at most `N` times and sleeps at most `N - 1` times.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Result<Self, ReadinessError> {
        if max_attempts == 0 {
            return Err(ReadinessError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        backoff.validate()?;
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: readiness::DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Attempt counter for one readiness check. Never decreases; a new check
/// starts from a new `RetryState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    /// Record the start of an attempt and return its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}
