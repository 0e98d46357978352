//! PostgreSQL readiness probe.
//!
//! Opens a single connection with sqlx, runs `SELECT 1` and closes it. Only
//! transport-level failures and the SQLSTATEs Postgres reports while it is
//! still starting up are retried; everything else is treated as a
//! configuration problem.

use super::{ProbeFailure, ProbeResult, ReadinessProbe};
use crate::connection::ConnectionTarget;
use crate::constants::sqlstate;
use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use std::io::ErrorKind;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PostgresProbe {
    connect_timeout: Duration,
}

impl PostgresProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for PostgresProbe {
    fn default() -> Self {
        Self::new(Duration::from_millis(
            crate::constants::readiness::DEFAULT_CONNECT_TIMEOUT_MS,
        ))
    }
}

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    async fn try_connect(&self, target: &ConnectionTarget) -> ProbeResult {
        let options = target.connect_options();

        let mut connection = match tokio::time::timeout(
            self.connect_timeout,
            PgConnection::connect_with(&options),
        )
        .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return classify_connect_error(&e),
            Err(_) => {
                return ProbeResult::transient(format!(
                    "connection attempt timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            }
        };

        if let Err(e) = sqlx::query("SELECT 1").execute(&mut connection).await {
            return classify_connect_error(&e);
        }

        if let Err(e) = connection.close().await {
            debug!(target = %target, error = %e, "Probe connection did not close cleanly");
        }

        ProbeResult::Success
    }
}

/// Map a sqlx error onto retry / abort
pub fn classify_connect_error(error: &sqlx::Error) -> ProbeResult {
    let failure = ProbeFailure::from_error(error);
    let transient = match error {
        sqlx::Error::Io(io) => is_transient_io(io.kind()),
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    };

    if transient {
        ProbeResult::TransientFailure(failure)
    } else {
        ProbeResult::FatalFailure(failure)
    }
}

fn is_transient_io(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::TimedOut
            | ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::AddrNotAvailable
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

/// SQLSTATEs returned while the server is starting, restarting or saturated
pub fn is_transient_sqlstate(code: &str) -> bool {
    matches!(
        code,
        sqlstate::CANNOT_CONNECT_NOW | sqlstate::ADMIN_SHUTDOWN | sqlstate::TOO_MANY_CONNECTIONS
    ) || code.starts_with(sqlstate::CONNECTION_EXCEPTION_CLASS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn io_error(kind: ErrorKind) -> sqlx::Error {
        sqlx::Error::Io(io::Error::new(kind, "probe"))
    }

    #[test]
    fn test_transport_errors_are_transient() {
        for kind in [
            ErrorKind::ConnectionRefused,
            ErrorKind::ConnectionReset,
            ErrorKind::TimedOut,
            ErrorKind::UnexpectedEof,
        ] {
            assert!(
                matches!(classify_connect_error(&io_error(kind)), ProbeResult::TransientFailure(_)),
                "{kind:?} should be retried"
            );
        }
    }

    #[test]
    fn test_other_io_errors_are_fatal() {
        let result = classify_connect_error(&io_error(ErrorKind::PermissionDenied));
        assert!(matches!(result, ProbeResult::FatalFailure(_)));
    }

    #[test]
    fn test_protocol_and_configuration_errors_are_fatal() {
        let protocol = sqlx::Error::Protocol("unexpected message".to_string());
        assert!(matches!(classify_connect_error(&protocol), ProbeResult::FatalFailure(_)));

        let configuration = sqlx::Error::Configuration("bad sslmode".into());
        assert!(matches!(
            classify_connect_error(&configuration),
            ProbeResult::FatalFailure(_)
        ));
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(matches!(
            classify_connect_error(&sqlx::Error::PoolTimedOut),
            ProbeResult::TransientFailure(_)
        ));
    }

    #[test]
    fn test_sqlstate_classification() {
        assert!(is_transient_sqlstate("57P03"));
        assert!(is_transient_sqlstate("57P01"));
        assert!(is_transient_sqlstate("53300"));
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("08001"));

        assert!(!is_transient_sqlstate(sqlstate::INVALID_PASSWORD));
        assert!(!is_transient_sqlstate(sqlstate::INVALID_AUTHORIZATION));
        assert!(!is_transient_sqlstate("3D000"));
        assert!(!is_transient_sqlstate("42601"));
    }

    #[test]
    fn test_failure_carries_error_message() {
        match classify_connect_error(&io_error(ErrorKind::ConnectionRefused)) {
            ProbeResult::TransientFailure(failure) => assert!(failure.reason().contains("probe")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
