//! Docker-backed [`ContainerHandle`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{InspectContainerOptions, LogOutput};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerInspectResponse, PortBinding};
use futures::StreamExt;
use url::{Host, Url};

use crate::container::{ContainerHandle, ExecResult};
use crate::error::{Result, WaitError};

/// Connect to the local Docker daemon.
///
/// Tries bollard's defaults first (honours `DOCKER_HOST`), then the rootless
/// socket under `$XDG_RUNTIME_DIR`.
pub async fn connect_docker() -> Result<Docker> {
    let docker = Docker::connect_with_local_defaults()?;
    if docker.ping().await.is_ok() {
        return Ok(docker);
    }

    #[cfg(unix)]
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        let socket = format!("{}/docker.sock", runtime_dir);
        if std::path::Path::new(&socket).exists() {
            let rootless =
                Docker::connect_with_socket(&socket, 120, bollard::API_DEFAULT_VERSION)?;
            rootless.ping().await?;
            tracing::debug!("Connected to rootless Docker at {}", socket);
            return Ok(rootless);
        }
    }

    docker.ping().await?;
    Ok(docker)
}

/// Host the daemon publishes mapped ports on, derived from `DOCKER_HOST`.
///
/// Only `tcp://` hosts are remote; sockets and pipes publish on `localhost`.
/// IPv6 literals come back without brackets so they can be fed straight to
/// `lookup_host`.
fn docker_host_address(docker_host: Option<&str>) -> String {
    let Some(url) = docker_host
        .filter(|h| h.starts_with("tcp://"))
        .and_then(|h| Url::parse(h).ok())
    else {
        return "localhost".to_string();
    };

    match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => "localhost".to_string(),
    }
}

/// Refuse containers that are not running; there is nothing to wait for.
fn ensure_running(container: &str, info: &ContainerInspectResponse) -> Result<()> {
    let state = info.state.as_ref();
    if state.and_then(|s| s.running).unwrap_or(false) {
        return Ok(());
    }

    Err(WaitError::NotRunning {
        container: container.to_string(),
        status: state
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Parse a Docker port key such as `8080/tcp`. Non-TCP ports are skipped.
fn parse_port_key(key: &str) -> Option<u16> {
    match key.split_once('/') {
        Some((port, "tcp")) => port.parse().ok(),
        Some(_) => None,
        None => key.parse().ok(),
    }
}

fn first_host_port(bindings: &Option<Vec<PortBinding>>) -> Option<u16> {
    bindings
        .as_ref()?
        .iter()
        .filter_map(|b| b.host_port.as_deref())
        .find_map(|p| p.parse().ok())
}

/// A started Docker container, snapshotted at inspection time.
pub struct DockerContainer {
    docker: Docker,
    id: String,
    name: String,
    host: String,
    exposed: Vec<u16>,
    bindings: BTreeMap<u16, u16>,
    liveness_override: Option<BTreeSet<u16>>,
}

impl DockerContainer {
    /// Inspect a running container by id or name.
    pub async fn inspect(docker: Docker, container: &str) -> Result<Self> {
        let info = docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await?;
        ensure_running(container, &info)?;

        let host = docker_host_address(std::env::var("DOCKER_HOST").ok().as_deref());
        Ok(Self::from_inspect(docker, container, host, info))
    }

    fn from_inspect(
        docker: Docker,
        container: &str,
        host: String,
        info: ContainerInspectResponse,
    ) -> Self {
        let id = info.id.clone().unwrap_or_else(|| container.to_string());
        let name = info
            .name
            .as_deref()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| container.to_string());

        let port_map: HashMap<String, Option<Vec<PortBinding>>> = info
            .network_settings
            .and_then(|n| n.ports)
            .unwrap_or_default();
        let bindings: BTreeMap<u16, u16> = port_map
            .iter()
            .filter_map(|(key, b)| Some((parse_port_key(key)?, first_host_port(b)?)))
            .collect();

        // Images often EXPOSE more than was published; only published ports
        // can be reached from the host.
        let mut exposed: Vec<u16> = info
            .config
            .as_ref()
            .and_then(|c| c.exposed_ports.as_ref())
            .map(|ports| ports.keys().filter_map(|k| parse_port_key(k)).collect())
            .unwrap_or_default();
        exposed.retain(|p| bindings.contains_key(p));
        exposed.sort_unstable();
        exposed.dedup();

        Self {
            docker,
            id,
            name,
            host,
            exposed,
            bindings,
            liveness_override: None,
        }
    }

    /// Check only these host ports instead of every mapped port.
    pub fn with_liveness_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.liveness_override = Some(ports.into_iter().collect());
        self
    }

    /// Override the host address mapped ports are reached on.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

#[async_trait]
impl ContainerHandle for DockerContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn exposed_ports(&self) -> Vec<u16> {
        self.exposed.clone()
    }

    fn mapped_port(&self, exposed: u16) -> Result<u16> {
        self.bindings
            .get(&exposed)
            .copied()
            .ok_or_else(|| WaitError::PortMapping {
                port: exposed,
                reason: format!("no host binding on container '{}'", self.name),
            })
    }

    fn liveness_check_ports(&self) -> BTreeSet<u16> {
        match &self.liveness_override {
            Some(ports) => ports.clone(),
            None => self
                .exposed
                .iter()
                .filter_map(|p| self.bindings.get(p).copied())
                .collect(),
        }
    }

    async fn exec(&self, cmd: &[&str]) -> Result<ExecResult> {
        let exec_err = |e: bollard::errors::Error| WaitError::Exec {
            container: self.name.clone(),
            reason: e.to_string(),
        };

        let exec = self
            .docker
            .create_exec(
                &self.id,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(exec_err)?;

        let mut result = ExecResult::default();

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(exec_err)?
        {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk.map_err(exec_err)? {
                        LogOutput::StdOut { message } => {
                            result.stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        LogOutput::StdErr { message } => {
                            result.stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                tracing::trace!("Exec in '{}' started detached", self.name);
            }
        }

        result.exit_code = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(exec_err)?
            .exit_code;

        Ok(result)
    }
}
