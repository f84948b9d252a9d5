//! Narrow adapter over the container engine (`spec.md` §4.4). The engine
//! only ever talks to the `ContainerRuntime` trait; the `bollard`-backed
//! implementation is the only piece that knows about the Docker Engine API.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::models::{
    DeviceRequest, EndpointIpamConfig, EndpointSettings, HostConfig, Network, NetworkingConfig,
    PortBinding,
};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use futures_util::stream::StreamExt;

/// Declares the container the engine wants created for a session.
/// Mirrors `spec.md` §4.4's `CreateContainer(spec)`.
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub workspace_host_path: String,
    pub gpu_uuid: String,
    pub network_name: String,
    pub static_ip: String,
    pub host_port: u16,
    pub pids_limit: i64,
}

pub struct CreatedContainer {
    pub id: String,
    pub assigned_ip: String,
}

#[derive(Debug, Clone)]
pub struct InspectResult {
    pub id: String,
    pub running: bool,
    pub ip: Option<String>,
    pub image: Option<String>,
    pub host_port: Option<u16>,
}

/// A container discovered live on the bridge network with no corresponding
/// `SessionRecord` — a candidate for orphan cleanup at startup.
#[derive(Debug, Clone)]
pub struct LiveContainer {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ensure_private_network(&self, name: &str, subnet: &str) -> Result<()>;

    async fn build_session_image(
        &self,
        context_tar: Vec<u8>,
        tag: &str,
        build_args: HashMap<String, String>,
    ) -> Result<String>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<CreatedContainer>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str, graceful_timeout_secs: i64) -> Result<()>;

    async fn remove_container(&self, id: &str) -> Result<()>;

    async fn inspect_container(&self, id: &str) -> Result<Option<InspectResult>>;

    /// Currently assigned IPv4 addresses of containers attached to `network_name`.
    async fn list_network_ips(&self, network_name: &str) -> Result<Vec<String>>;

    /// Live containers named after the session-container pattern, for
    /// orphan reconciliation at startup.
    async fn list_session_containers(&self, network_name: &str) -> Result<Vec<LiveContainer>>;
}

pub struct BollardContainerRuntime {
    docker: Docker,
}

impl BollardContainerRuntime {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("failed to connect to the local Docker daemon")?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for BollardContainerRuntime {
    async fn ensure_private_network(&self, name: &str, subnet: &str) -> Result<()> {
        let existing = self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await;
        if existing.is_ok() {
            return Ok(());
        }

        let ipam_config = bollard::models::Ipam {
            config: Some(vec![bollard::models::IpamConfig {
                subnet: Some(subnet.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        };

        self.docker
            .create_network(CreateNetworkOptions {
                name: name.to_string(),
                driver: "bridge".to_string(),
                ipam: ipam_config,
                ..Default::default()
            })
            .await
            .context("failed to create bridge network")?;
        Ok(())
    }

    async fn build_session_image(
        &self,
        context_tar: Vec<u8>,
        tag: &str,
        build_args: HashMap<String, String>,
    ) -> Result<String> {
        let options = BuildImageOptions {
            t: tag.to_string(),
            buildargs: build_args,
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context_tar.into()));
        while let Some(result) = stream.next().await {
            let info = result.context("docker build stream error")?;
            if let Some(error) = info.error {
                anyhow::bail!("image build failed: {error}");
            }
        }
        Ok(tag.to_string())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<CreatedContainer> {
        let device_request = DeviceRequest {
            driver: Some("nvidia".to_string()),
            device_ids: Some(vec![spec.gpu_uuid.clone()]),
            capabilities: Some(vec![vec!["gpu".to_string()]]),
            ..Default::default()
        };

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            "22/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert("22/tcp".to_string(), HashMap::new());

        let mut endpoints_config = HashMap::new();
        endpoints_config.insert(
            spec.network_name.clone(),
            EndpointSettings {
                ipam_config: Some(EndpointIpamConfig {
                    ipv4_address: Some(spec.static_ip.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let host_config = HostConfig {
            binds: Some(vec![format!("{}:/workspace", spec.workspace_host_path)]),
            device_requests: Some(vec![device_request]),
            port_bindings: Some(port_bindings),
            cap_drop: Some(vec!["ALL".to_string()]),
            cap_add: Some(vec![
                "SETUID".to_string(),
                "SETGID".to_string(),
                "DAC_OVERRIDE".to_string(),
                "CHOWN".to_string(),
            ]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            pids_limit: Some(spec.pids_limit),
            network_mode: Some(spec.network_name.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            networking_config: Some(NetworkingConfig { endpoints_config }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .context("failed to create container")?;

        Ok(CreatedContainer {
            id: response.id,
            assigned_ip: spec.static_ip.clone(),
        })
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<bollard::container::StartContainerOptions<String>>)
            .await
            .context("failed to start container")?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, graceful_timeout_secs: i64) -> Result<()> {
        self.docker
            .stop_container(
                id,
                Some(StopContainerOptions {
                    t: graceful_timeout_secs,
                }),
            )
            .await
            .context("failed to stop container")?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .context("failed to remove container")?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<Option<InspectResult>> {
        let inspect = match self
            .docker
            .inspect_container(id, None::<bollard::container::InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                return Ok(None);
            }
            Err(err) => return Err(err).context("failed to inspect container"),
        };

        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);
        let image = inspect.config.as_ref().and_then(|c| c.image.clone());
        let ip = inspect
            .network_settings
            .as_ref()
            .and_then(|n| n.networks.as_ref())
            .and_then(|networks| networks.values().next())
            .and_then(|endpoint| endpoint.ip_address.clone())
            .filter(|ip| !ip.is_empty());

        Ok(Some(InspectResult {
            id: inspect.id.unwrap_or_default(),
            running,
            ip,
            image,
            host_port: None,
        }))
    }

    async fn list_network_ips(&self, network_name: &str) -> Result<Vec<String>> {
        let network: Network = self
            .docker
            .inspect_network(network_name, None::<InspectNetworkOptions<String>>)
            .await
            .context("failed to inspect network")?;

        let ips = network
            .containers
            .unwrap_or_default()
            .values()
            .filter_map(|endpoint| endpoint.ipv4_address.clone())
            .map(|cidr| cidr.split('/').next().unwrap_or_default().to_string())
            .filter(|ip| !ip.is_empty())
            .collect();
        Ok(ips)
    }

    async fn list_session_containers(&self, network_name: &str) -> Result<Vec<LiveContainer>> {
        let mut filters = HashMap::new();
        filters.insert("network".to_string(), vec![network_name.to_string()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .context("failed to list containers")?;

        Ok(containers
            .into_iter()
            .map(|c| LiveContainer {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string(),
            })
            .collect())
    }
}

/// Packs a fixed set of `(path, contents)` pairs into an in-memory tar
/// archive suitable as a Docker build context.
pub fn build_tar_context(files: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, contents.as_slice())?;
    }
    let mut tar_bytes = builder.into_inner()?;
    tar_bytes.flush()?;
    Ok(tar_bytes)
}


#[cfg(test)]
pub use fake::FakeContainerRuntime;
