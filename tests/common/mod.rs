//! Shared fakes for integration tests: a probe that replays a script and a
//! runtime that keeps containers in memory.

#![allow(dead_code)]

use async_trait::async_trait;
use pg_test_container::endpoint::{DaemonUri, HostBinding, PortBindings, PortKey};
use pg_test_container::probe::{ProbeResult, ReadinessProbe};
use pg_test_container::resilience::BackoffPolicy;
use pg_test_container::runtime::{
    ContainerGuard, ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeError,
};
use pg_test_container::{ConnectionTarget, TestDatabaseConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const HOST_PORT: u16 = 49153;

/// Replays scripted outcomes, then repeats `fallback` forever
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeResult>>,
    fallback: ProbeResult,
    calls: AtomicU32,
    targets: Mutex<Vec<ConnectionTarget>>,
}

impl ScriptedProbe {
    pub fn new(script: Vec<ProbeResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: ProbeResult::transient("connection refused"),
            calls: AtomicU32::new(0),
            targets: Mutex::new(Vec::new()),
        }
    }

    /// Transient failure on every call
    pub fn always_refused() -> Self {
        Self::new(Vec::new())
    }

    pub fn always(result: ProbeResult) -> Self {
        Self::new(Vec::new()).with_fallback(result)
    }

    /// `failures` transient failures followed by success
    pub fn succeeds_after(failures: usize) -> Self {
        let mut script = vec![ProbeResult::transient("connection refused"); failures];
        script.push(ProbeResult::Success);
        Self::new(script)
    }

    pub fn with_fallback(mut self, fallback: ProbeResult) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<ConnectionTarget> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    async fn try_connect(&self, target: &ConnectionTarget) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Runtime that never touches a daemon.
///
/// Port bindings stay empty for the first `unpublished_reads` reads, which
/// models a container that has started but not yet published its port. The
/// first `failed_reads` reads return an error instead.
pub struct InMemoryRuntime {
    bindings: PortBindings,
    daemon_uri: Option<DaemonUri>,
    unpublished_reads: u32,
    failed_reads: u32,
    fail_start: bool,
    pub builds: AtomicU32,
    pub starts: AtomicU32,
    pub removals: AtomicU32,
    pub binding_reads: AtomicU32,
    pub built_specs: Mutex<Vec<ContainerSpec>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self {
            bindings: published(HOST_PORT),
            daemon_uri: None,
            unpublished_reads: 0,
            failed_reads: 0,
            fail_start: false,
            builds: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            removals: AtomicU32::new(0),
            binding_reads: AtomicU32::new(0),
            built_specs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bindings(mut self, bindings: PortBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_daemon_uri(mut self, daemon_uri: DaemonUri) -> Self {
        self.daemon_uri = Some(daemon_uri);
        self
    }

    pub fn publishing_after(mut self, reads: u32) -> Self {
        self.unpublished_reads = reads;
        self
    }

    pub fn failing_binding_reads(mut self, reads: u32) -> Self {
        self.failed_reads = reads;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn build(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let n = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        self.built_specs.lock().unwrap().push(spec.clone());
        Ok(ContainerHandle::new(format!("mem-{n}"), spec.name.clone()))
    }

    async fn start(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(RuntimeError::Other("port is already allocated".to_string()));
        }
        Ok(())
    }

    async fn stop_and_remove(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_port_bindings(
        &self,
        _handle: &ContainerHandle,
    ) -> Result<PortBindings, RuntimeError> {
        let read = self.binding_reads.fetch_add(1, Ordering::SeqCst);
        if read < self.failed_reads {
            return Err(RuntimeError::Other("container inspect timed out".to_string()));
        }
        if read < self.unpublished_reads {
            let mut pending = PortBindings::new();
            pending.declare(PortKey::tcp(5432));
            return Ok(pending);
        }
        Ok(self.bindings.clone())
    }

    fn daemon_uri(&self) -> Option<DaemonUri> {
        self.daemon_uri.clone()
    }
}

/// `5432/tcp` published on every interface at `host_port`
pub fn published(host_port: u16) -> PortBindings {
    PortBindings::new().with_binding(
        PortKey::tcp(5432),
        HostBinding::parse("0.0.0.0", &host_port.to_string()).unwrap(),
    )
}

/// Defaults with a fixed 100ms backoff and an override variable nobody sets
pub fn test_config(max_attempts: u32) -> TestDatabaseConfig {
    let mut config = TestDatabaseConfig::default();
    config.readiness.max_attempts = max_attempts;
    config.readiness.backoff = BackoffPolicy::fixed(Duration::from_millis(100));
    config.override_env_var = "PG_TEST_CONTAINER_UNSET_OVERRIDE".to_string();
    config
}

/// A guard for a container that has been built and started
pub async fn started_guard(runtime: Arc<InMemoryRuntime>) -> ContainerGuard {
    let spec = ContainerSpec::postgres(&TestDatabaseConfig::default());
    let mut guard = ContainerGuard::build(runtime, &spec).await.unwrap();
    guard.start().await.unwrap();
    guard
}
