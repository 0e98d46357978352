//! # Resilience Module
//!
//! Bounded retry for container readiness.
//!
//! ## Architecture
//!
//! - **Backoff**: fixed or capped exponential delay between attempts
//! - **Retry bounds**: `max_attempts` counts probe invocations, first included
//! - **Readiness gate**: drives the probe against freshly resolved targets
//!   until success, exhaustion, cancellation or a fatal failure
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pg_test_container::endpoint::PortKey;
//! use pg_test_container::probe::PostgresProbe;
//! use pg_test_container::resilience::{BackoffPolicy, ReadinessGate, RetryPolicy};
//! use pg_test_container::runtime::{ContainerHandle, ContainerRuntime};
//! use pg_test_container::ConnectionSettings;
//! use std::time::Duration;
//!
//! # async fn example(runtime: &dyn ContainerRuntime, handle: &ContainerHandle) -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::new(10, BackoffPolicy::fixed(Duration::from_millis(500)))?;
//! let gate = ReadinessGate::new(policy, PortKey::tcp(5432), ConnectionSettings::default());
//!
//! let report = gate.await_ready(runtime, handle, &PostgresProbe::default()).await?;
//! println!("ready after {} attempts at {}", report.attempts, report.target);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod errors;
pub mod readiness_gate;

pub use backoff::{BackoffPolicy, RetryPolicy, RetryState};
pub use errors::ReadinessError;
pub use readiness_gate::{ReadinessGate, ReadinessReport};
