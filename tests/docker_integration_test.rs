//! End-to-end provisioning against a real Docker daemon.
//!
//! Run with `cargo test -- --ignored` on a machine with Docker available.

use pg_test_container::logging::init_structured_logging;
use pg_test_container::runtime::DockerRuntimeOptions;
use pg_test_container::{
    ConfigLoader, ContainerGuard, ContainerSpec, DockerRuntime, PortKey, PostgresProbe,
    ReadinessGate, TestDatabase,
};
use std::sync::Arc;

#[tokio::test]
#[ignore] // Requires a Docker daemon
async fn test_provision_query_and_dispose() {
    init_structured_logging();
    std::env::remove_var("PG_TEST_DATABASE_URL");

    let mut config = ConfigLoader::new()
        .with_env_prefix("PGTC_DOCKER_IT")
        .load()
        .unwrap();
    config.container.unique_name = true;
    config.container.volume = None;

    let mut db = TestDatabase::start(&config).await.unwrap();
    let pool = db.pool().await.unwrap();

    let search_path: (String,) = sqlx::query_as("SHOW search_path")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(search_path.0, "atoms");

    pool.close().await;
    db.dispose().await.unwrap();
    db.dispose().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a Docker daemon
async fn test_wrong_password_is_a_configuration_error() {
    init_structured_logging();
    std::env::remove_var("PG_TEST_DATABASE_URL");

    let mut config = ConfigLoader::new()
        .with_env_prefix("PGTC_DOCKER_IT_AUTH")
        .load()
        .unwrap();
    config.container.unique_name = true;
    config.container.volume = None;

    // The server is created with one password and probed with another
    let runtime = DockerRuntime::connect(DockerRuntimeOptions::from(&config.container))
        .await
        .unwrap();
    let spec = ContainerSpec::postgres(&config);
    let mut guard = ContainerGuard::build(Arc::new(runtime), &spec).await.unwrap();
    guard.start().await.unwrap();

    let gate = ReadinessGate::new(
        config.readiness.retry_policy().unwrap(),
        PortKey::tcp(5432),
        config.database.clone().with_password("not-the-password"),
    );
    let probe = PostgresProbe::new(config.readiness.connect_timeout());
    let err = gate
        .await_ready(guard.runtime(), guard.handle(), &probe)
        .await
        .unwrap_err();

    guard.dispose().await.unwrap();
    assert!(err.is_configuration(), "unexpected {err:?}");
}
