//! Docker implementation of [`ContainerRuntime`] using the Docker Engine API
//! (via bollard).

use super::{ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeError};
use crate::config::ContainerConfig;
use crate::constants::env::DOCKER_HOST;
use crate::endpoint::{DaemonUri, HostBinding, PortBindings, PortKey};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Behaviour switches for [`DockerRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerRuntimeOptions {
    /// Remove a leftover container that already holds the requested name
    pub replace_stale: bool,
    /// Pull the image when it is not present locally
    pub pull_missing: bool,
    /// Grace period passed to `docker stop`
    pub stop_timeout_secs: i64,
}

impl Default for DockerRuntimeOptions {
    fn default() -> Self {
        Self {
            replace_stale: true,
            pull_missing: true,
            stop_timeout_secs: 10,
        }
    }
}

impl From<&ContainerConfig> for DockerRuntimeOptions {
    fn from(config: &ContainerConfig) -> Self {
        Self {
            replace_stale: config.replace_stale,
            pull_missing: config.pull_missing,
            stop_timeout_secs: i64::try_from(config.stop_timeout_secs).unwrap_or(i64::MAX),
        }
    }
}

pub struct DockerRuntime {
    docker: Docker,
    daemon_uri: Option<DaemonUri>,
    options: DockerRuntimeOptions,
}

impl DockerRuntime {
    /// Connect using the same defaults as the docker CLI (`DOCKER_HOST` or
    /// the local socket). A network daemon host name is resolved here, once.
    pub async fn connect(options: DockerRuntimeOptions) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_defaults()?;

        let daemon_uri = match std::env::var(DOCKER_HOST) {
            Ok(host) if !host.trim().is_empty() => match DaemonUri::parse(host.trim()) {
                Ok(uri) => Some(uri.resolve_host().await),
                Err(e) => {
                    warn!(docker_host = %host, error = %e, "Ignoring unparsable DOCKER_HOST");
                    None
                }
            },
            _ => None,
        };

        info!(
            daemon = daemon_uri.as_ref().map(ToString::to_string).as_deref().unwrap_or("local"),
            "🐳 Connected to Docker daemon"
        );

        Ok(Self {
            docker,
            daemon_uri,
            options,
        })
    }

    /// Wrap an existing client, e.g. one built with custom TLS settings
    pub fn with_client(
        docker: Docker,
        daemon_uri: Option<DaemonUri>,
        options: DockerRuntimeOptions,
    ) -> Self {
        Self {
            docker,
            daemon_uri,
            options,
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(DockerError::DockerResponseServerError { status_code: 404, .. })
                if self.options.pull_missing => {}
            Err(e) => return Err(e.into()),
        }

        info!(image = %image, "📦 Pulling image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image = %image, status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::ImagePull {
                        image: image.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn container_config(spec: &ContainerSpec) -> Config<String> {
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports
            .iter()
            .map(|key| (key.to_string(), HashMap::new()))
            .collect();

        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                source: Some(m.source.clone()),
                target: Some(m.target.clone()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let labels: HashMap<String, String> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // Every exposed port is published on an ephemeral host port
        let host_config = HostConfig {
            publish_all_ports: Some(true),
            mounts: Some(mounts),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    async fn remove_by_id(&self, id: &str) -> Result<(), RuntimeError> {
        let stop_options = StopContainerOptions {
            t: self.options.stop_timeout_secs,
        };
        match self.docker.stop_container(id, Some(stop_options)).await {
            Ok(()) => {}
            // 304: already stopped, 404: already gone
            Err(DockerError::DockerResponseServerError { status_code: 304 | 404, .. }) => {}
            Err(e) => {
                warn!(
                    container = %id,
                    error = %e,
                    "Failed to stop container, forcing removal"
                );
            }
        }

        let remove_options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(remove_options)).await {
            Ok(()) => Ok(()),
            Err(DockerError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            // 409: removal already in progress
            Err(DockerError::DockerResponseServerError { status_code: 409, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn build(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        self.ensure_image(&spec.image).await?;

        let config = Self::container_config(spec);
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = match self
            .docker
            .create_container(Some(options.clone()), config.clone())
            .await
        {
            Ok(response) => response,
            Err(DockerError::DockerResponseServerError { status_code: 409, .. })
                if self.options.replace_stale =>
            {
                warn!(container = %spec.name, "Replacing stale container with the same name");
                self.remove_by_id(&spec.name).await?;
                self.docker.create_container(Some(options), config).await?
            }
            Err(e) => return Err(e.into()),
        };

        for warning in &response.warnings {
            warn!(container = %spec.name, warning = %warning, "Docker create warning");
        }

        info!(container = %spec.name, id = %response.id, image = %spec.image, "Created container");
        Ok(ContainerHandle::new(response.id, spec.name.clone()))
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.docker
            .start_container(handle.id(), None::<StartContainerOptions<String>>)
            .await?;
        info!(container = %handle.name(), "Started container");
        Ok(())
    }

    async fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.remove_by_id(handle.id()).await?;
        info!(container = %handle.name(), "Removed container");
        Ok(())
    }

    async fn get_port_bindings(
        &self,
        handle: &ContainerHandle,
    ) -> Result<PortBindings, RuntimeError> {
        let inspect = match self
            .docker
            .inspect_container(handle.id(), None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(DockerError::DockerResponseServerError { status_code: 404, .. }) => {
                return Err(RuntimeError::NotFound(handle.name().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let ports = inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default();

        let mut bindings = PortBindings::new();
        for (key, published) in ports {
            let key: PortKey = match key.parse() {
                Ok(key) => key,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping unparsable port key");
                    continue;
                }
            };
            bindings.declare(key);

            for binding in published.unwrap_or_default() {
                let address = binding.host_ip.unwrap_or_default();
                let port = binding.host_port.unwrap_or_default();
                match HostBinding::parse(&address, &port) {
                    Ok(host_binding) => bindings.insert(key, host_binding),
                    Err(e) => debug!(key = %key, error = %e, "Skipping unparsable binding"),
                }
            }
        }

        Ok(bindings)
    }

    fn daemon_uri(&self) -> Option<DaemonUri> {
        self.daemon_uri.clone()
    }
}
