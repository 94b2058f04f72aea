use super::ContainerRuntime;
use crate::error::{Error, Result};
use crate::types::{ContainerRecord, PublishedPort};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::ContainerSummary;
use bollard::Docker;
use log::{debug, info};

/// Seconds bollard waits on the daemon before giving up on a request.
const DOCKER_TIMEOUT: u64 = 30;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to an explicit `unix://` or `tcp://` host, or to the local
    /// defaults (which honour `DOCKER_HOST`) when none is given.
    ///
    /// Connecting is lazy; an unreachable daemon only shows up on the first
    /// listing.
    pub fn connect(host: Option<&str>) -> Result<Self> {
        let docker = match host {
            Some(host) => Self::connect_to_host(host)?,
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self { docker })
    }

    fn connect_to_host(host: &str) -> Result<Docker> {
        if let Some(path) = host.strip_prefix("unix://") {
            info!("Using Docker socket {}", path);
            Ok(Docker::connect_with_socket(
                path,
                DOCKER_TIMEOUT,
                bollard::API_DEFAULT_VERSION,
            )?)
        } else if host.starts_with('/') {
            info!("Using Docker socket {}", host);
            Ok(Docker::connect_with_socket(
                host,
                DOCKER_TIMEOUT,
                bollard::API_DEFAULT_VERSION,
            )?)
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            info!("Using Docker endpoint {}", host);
            Ok(Docker::connect_with_http(
                host,
                DOCKER_TIMEOUT,
                bollard::API_DEFAULT_VERSION,
            )?)
        } else {
            Err(Error::InvalidConfig(format!(
                "docker host '{}' must start with unix:// or tcp://",
                host
            )))
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>> {
        let opts = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        debug!("Docker reported {} containers", containers.len());
        Ok(containers.into_iter().map(to_record).collect())
    }
}

fn to_record(c: ContainerSummary) -> ContainerRecord {
    let name = c
        .names
        .as_ref()
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .filter(|n| !n.is_empty());

    let ports = c
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| PublishedPort {
            ip: p.ip,
            private_port: p.private_port,
            public_port: p.public_port,
        })
        .collect();

    ContainerRecord {
        name,
        labels: c.labels.unwrap_or_default(),
        image: c.image,
        state: c.state.unwrap_or_default(),
        ports,
    }
}
