//! Scoped ownership of a container: once built, it is torn down exactly once
//! on every exit path.

use super::{ContainerHandle, ContainerRuntime, ContainerSpec, ContainerState};
use crate::connection::{ConnectionSettings, ConnectionTarget};
use crate::endpoint::{resolve, PortKey};
use crate::error::{Result, TestDbError};
use crate::logging::log_container_operation;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns a [`ContainerHandle`] and the runtime that created it.
///
/// [`dispose`](Self::dispose) is idempotent and safe in every state. A guard
/// dropped without being disposed schedules the teardown on the current
/// tokio runtime.
pub struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
}

impl ContainerGuard {
    /// Build a container and take ownership of it before anything else can fail
    pub async fn build(runtime: Arc<dyn ContainerRuntime>, spec: &ContainerSpec) -> Result<Self> {
        let handle = runtime.build(spec).await?;
        log_container_operation("build", handle.name(), Some(handle.id()), "created", None);
        Ok(Self { runtime, handle })
    }

    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub fn state(&self) -> ContainerState {
        self.handle.state()
    }

    /// `Created → Starting`, then ask the runtime to start the container
    pub async fn start(&mut self) -> Result<()> {
        self.handle.transition(ContainerState::Starting)?;
        self.runtime.start(&self.handle).await?;
        log_container_operation(
            "start",
            self.handle.name(),
            Some(self.handle.id()),
            "starting",
            None,
        );
        Ok(())
    }

    /// `Starting → Running`, once readiness has been confirmed
    pub fn mark_running(&mut self) -> Result<()> {
        self.handle.transition(ContainerState::Running)?;
        log_container_operation(
            "ready",
            self.handle.name(),
            Some(self.handle.id()),
            "running",
            None,
        );
        Ok(())
    }

    /// Resolve the current connection target. Only a running container has one.
    pub async fn connection_target(
        &self,
        key: PortKey,
        settings: &ConnectionSettings,
    ) -> Result<ConnectionTarget> {
        if self.handle.state() != ContainerState::Running {
            return Err(TestDbError::NotRunning {
                container: self.handle.name().to_string(),
                state: self.handle.state(),
            });
        }

        let bindings = self.runtime.get_port_bindings(&self.handle).await?;
        let daemon_uri = self.runtime.daemon_uri();
        let endpoint = resolve(&bindings, key, daemon_uri.as_ref()).ok_or_else(|| {
            TestDbError::BindingUnavailable {
                container: self.handle.name().to_string(),
                key,
            }
        })?;

        ConnectionTarget::new(endpoint, settings).map_err(TestDbError::InvalidTarget)
    }

    /// Stop and remove the container. Repeated calls are no-ops.
    pub async fn dispose(&mut self) -> Result<()> {
        match self.handle.state() {
            ContainerState::Disposed => return Ok(()),
            ContainerState::Stopped => {}
            _ => self.handle.transition(ContainerState::Stopped)?,
        }

        self.runtime.stop_and_remove(&self.handle).await?;
        self.handle.transition(ContainerState::Disposed)?;
        log_container_operation(
            "dispose",
            self.handle.name(),
            Some(self.handle.id()),
            "disposed",
            None,
        );
        Ok(())
    }
}

impl std::fmt::Debug for ContainerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerGuard")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.handle.state().is_terminal() {
            return;
        }

        let handle = self.handle.detached_copy();
        let runtime = Arc::clone(&self.runtime);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                info!(
                    container = %handle.name(),
                    "Container dropped without dispose, scheduling teardown"
                );
                rt.spawn(async move {
                    if let Err(e) = runtime.stop_and_remove(&handle).await {
                        warn!(container = %handle.name(), error = %e, "Background teardown failed");
                    }
                });
            }
            Err(_) => {
                warn!(
                    container = %handle.name(),
                    id = %handle.id(),
                    "Container dropped outside a tokio runtime and was not removed"
                );
            }
        }
    }
}
