use crate::config::RuntimeConfig;
use crate::types::{ImageDigest, ImageName, ServiceName};
use bollard::Docker;
use bollard::models::{ContainerCreateBody, ContainerInspectResponse, HostConfig, MountPoint, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptionsBuilder,
};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

const REMOVE_OPTIONS: RemoveContainerOptions = RemoveContainerOptions {
    v: false,
    force: false,
    link: false,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("failed to pull {image}: {reason}")]
    PullFailure { image: ImageName, reason: String },
    #[error("failed to replace container {service}: {reason}")]
    ReplaceFailure { service: ServiceName, reason: String },
    #[error("container {service} was removed but did not start again: {reason}")]
    RunFailure { service: ServiceName, reason: String },
}

/// Port and volume bindings of a container, copied out of the inspect
/// response so the stop/remove/run sequence never reads through a handle
/// into runtime-owned data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingSnapshot {
    /// container port ("8080/tcp") -> host bindings
    pub port_bindings: HashMap<String, Vec<PortBinding>>,
    /// "host-path:container-path[:mode]"
    pub binds: Vec<String>,
}

impl BindingSnapshot {
    pub fn from_inspect(host_config: Option<&HostConfig>, mounts: Option<&[MountPoint]>) -> Self {
        let port_bindings = host_config
            .and_then(|hc| hc.port_bindings.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|(port, bindings)| (port.clone(), bindings.clone().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();

        let binds = mounts
            .unwrap_or_default()
            .iter()
            .filter_map(|mount| {
                let source = mount.source.as_deref()?;
                let destination = mount.destination.as_deref()?;
                Some(match mount.mode.as_deref() {
                    Some("") | None => format!("{source}:{destination}"),
                    Some(mode) => format!("{source}:{destination}:{mode}"),
                })
            })
            .collect();

        Self {
            port_bindings,
            binds,
        }
    }

    fn to_port_map(&self) -> HashMap<String, Option<Vec<PortBinding>>> {
        self.port_bindings
            .iter()
            .map(|(port, bindings)| (port.clone(), Some(bindings.clone())))
            .collect()
    }
}

/// One container as the runtime reports it right now. Always built from a
/// fresh inspect; holding a record across runtime calls is the caller's
/// staleness to manage.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRecord {
    pub name: ServiceName,
    pub image: ImageName,
    pub digest: ImageDigest,
    pub running: bool,
    pub bindings: BindingSnapshot,
}

impl ContainerRecord {
    pub fn from_inspect(details: ContainerInspectResponse) -> Self {
        let name = details
            .name
            .as_deref()
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();
        let image = details
            .config
            .as_ref()
            .and_then(|config| config.image.clone())
            .unwrap_or_default();
        let digest = details.image.clone().unwrap_or_default();
        let running = details
            .state
            .as_ref()
            .and_then(|state| state.running)
            .unwrap_or(false);
        let bindings =
            BindingSnapshot::from_inspect(details.host_config.as_ref(), details.mounts.as_deref());

        Self {
            name: ServiceName::new(name),
            image: ImageName::new(image),
            digest: ImageDigest::new(digest),
            running,
            bindings,
        }
    }
}

/// The seam between reconciliation logic and the container runtime.
pub trait ContainerRuntime: Send + Sync {
    fn list_containers(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerRecord>, RuntimeError>> + Send;

    fn inspect_container(
        &self,
        name: &ServiceName,
    ) -> impl Future<Output = Result<ContainerRecord, RuntimeError>> + Send;

    fn pull_image(
        &self,
        image: &ImageName,
    ) -> impl Future<Output = Result<ImageDigest, RuntimeError>> + Send;

    fn stop_container(
        &self,
        name: &ServiceName,
    ) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    fn remove_container(
        &self,
        name: &ServiceName,
    ) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    fn run_container(
        &self,
        image: &ImageName,
        name: &ServiceName,
        bindings: &BindingSnapshot,
    ) -> impl Future<Output = Result<ContainerRecord, RuntimeError>> + Send;
}

/// One way of getting an image onto the host. Strategies are tried in
/// order by [`pull_in_order`] until one yields a digest.
pub trait PullSource: Send + Sync {
    fn label(&self) -> &str;

    fn pull<'a>(&'a self, image: &'a ImageName) -> BoxFuture<'a, Result<ImageDigest, String>>;
}

pub async fn pull_in_order(
    sources: &[&dyn PullSource],
    image: &ImageName,
) -> Result<ImageDigest, RuntimeError> {
    let mut reasons = Vec::with_capacity(sources.len());
    for source in sources {
        match source.pull(image).await {
            Ok(digest) => {
                debug!("pulled {image} via {} (digest: {digest})", source.label());
                return Ok(digest);
            }
            Err(reason) => {
                warn!("pull of {image} via {} failed: {reason}", source.label());
                reasons.push(format!("{}: {reason}", source.label()));
            }
        }
    }
    Err(RuntimeError::PullFailure {
        image: image.clone(),
        reason: reasons.join("; "),
    })
}

/// Pull through the runtime API, draining the progress stream.
struct ApiPull<'a> {
    docker: &'a Docker,
    timeout: Duration,
}

impl PullSource for ApiPull<'_> {
    fn label(&self) -> &str {
        "api"
    }

    fn pull<'a>(&'a self, image: &'a ImageName) -> BoxFuture<'a, Result<ImageDigest, String>> {
        Box::pin(async move {
            let (repository, tag) = image.split();
            let options = CreateImageOptions {
                from_image: Some(repository.to_string()),
                tag: Some(tag.to_string()),
                ..Default::default()
            };
            let pull = async {
                let mut pull_stream = self.docker.create_image(Some(options), None, None);
                while let Some(result) = pull_stream.next().await {
                    let output = result.map_err(|e| e.to_string())?;
                    if let Some(status) = &output.status {
                        trace!("{status}");
                    }
                }
                image_digest(self.docker, image).await
            };
            match tokio::time::timeout(self.timeout, pull).await {
                Ok(result) => result,
                Err(_) => Err(format!("timed out after {}s", self.timeout.as_secs())),
            }
        })
    }
}

/// Pull by shelling out to the runtime binary. API pulls can fail for
/// reasons (auth plugin quirks) that the CLI path tolerates.
struct CliPull<'a> {
    docker: &'a Docker,
    docker_bin: &'a str,
    timeout: Duration,
}

impl PullSource for CliPull<'_> {
    fn label(&self) -> &str {
        "cli"
    }

    fn pull<'a>(&'a self, image: &'a ImageName) -> BoxFuture<'a, Result<ImageDigest, String>> {
        Box::pin(async move {
            let pull = async {
                let output = Command::new(self.docker_bin)
                    .args(["pull", image.as_str()])
                    .output()
                    .await
                    .map_err(|e| e.to_string())?;
                if !output.status.success() {
                    return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
                }
                image_digest(self.docker, image).await
            };
            match tokio::time::timeout(self.timeout, pull).await {
                Ok(result) => result,
                Err(_) => Err(format!("timed out after {}s", self.timeout.as_secs())),
            }
        })
    }
}

async fn image_digest(docker: &Docker, image: &ImageName) -> Result<ImageDigest, String> {
    let inspect = docker
        .inspect_image(image.as_str())
        .await
        .map_err(|e| e.to_string())?;
    inspect
        .id
        .map(ImageDigest::new)
        .ok_or_else(|| format!("image {image} has no id"))
}

pub struct DockerRuntime {
    docker: Docker,
    docker_bin: String,
    op_timeout: Duration,
    stop_timeout: i32,
}

impl DockerRuntime {
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self {
            docker,
            docker_bin: config.docker_bin.clone(),
            op_timeout: Duration::from_secs(config.operation_timeout),
            stop_timeout: config.stop_timeout,
        })
    }

    async fn bounded<T>(
        &self,
        what: &str,
        operation: impl Future<Output = Result<T, bollard::errors::Error>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "{what} timed out after {}s",
                self.op_timeout.as_secs()
            )),
        }
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let summaries = self
            .bounded(
                "list containers",
                self.docker
                    .list_containers(Some(ListContainersOptions::default())),
            )
            .await
            .map_err(RuntimeError::Unavailable)?;

        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(name) = summary
                .names
                .as_ref()
                .and_then(|names| names.first())
                .map(|name| name.trim_start_matches('/').to_string())
            else {
                continue;
            };
            let service = ServiceName::new(name);
            match self.inspect_container(&service).await {
                Ok(record) => records.push(record),
                // gone between list and inspect; the next cycle sees the truth
                Err(e) => warn!("could not inspect container {service}: {e}"),
            }
        }
        Ok(records)
    }

    async fn inspect_container(&self, name: &ServiceName) -> Result<ContainerRecord, RuntimeError> {
        let details = self
            .bounded(
                "inspect container",
                self.docker
                    .inspect_container(name.as_str(), None::<InspectContainerOptions>),
            )
            .await
            .map_err(RuntimeError::Unavailable)?;
        trace!(
            "container details: {}",
            serde_json::to_string_pretty(&details).unwrap_or_default()
        );
        Ok(ContainerRecord::from_inspect(details))
    }

    async fn pull_image(&self, image: &ImageName) -> Result<ImageDigest, RuntimeError> {
        let api = ApiPull {
            docker: &self.docker,
            timeout: self.op_timeout,
        };
        let cli = CliPull {
            docker: &self.docker,
            docker_bin: &self.docker_bin,
            timeout: self.op_timeout,
        };
        let sources: [&dyn PullSource; 2] = [&api, &cli];
        pull_in_order(&sources, image).await
    }

    async fn stop_container(&self, name: &ServiceName) -> Result<(), RuntimeError> {
        let options = StopContainerOptionsBuilder::new()
            .t(self.stop_timeout)
            .build();
        self.bounded(
            "stop container",
            self.docker.stop_container(name.as_str(), Some(options)),
        )
        .await
        .map(|_| ())
        .map_err(|reason| RuntimeError::ReplaceFailure {
            service: name.clone(),
            reason,
        })
    }

    async fn remove_container(&self, name: &ServiceName) -> Result<(), RuntimeError> {
        self.bounded(
            "remove container",
            self.docker
                .remove_container(name.as_str(), Some(REMOVE_OPTIONS)),
        )
        .await
        .map(|_| ())
        .map_err(|reason| RuntimeError::ReplaceFailure {
            service: name.clone(),
            reason,
        })
    }

    async fn run_container(
        &self,
        image: &ImageName,
        name: &ServiceName,
        bindings: &BindingSnapshot,
    ) -> Result<ContainerRecord, RuntimeError> {
        let host_config = HostConfig {
            port_bindings: Some(bindings.to_port_map()),
            binds: (!bindings.binds.is_empty()).then(|| bindings.binds.clone()),
            ..Default::default()
        };
        let body = ContainerCreateBody {
            image: Some(image.as_str().to_string()),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: Some(name.as_str().to_string()),
            ..Default::default()
        };

        let created = self
            .bounded(
                "create container",
                self.docker.create_container(Some(options), body),
            )
            .await
            .map_err(|reason| RuntimeError::RunFailure {
                service: name.clone(),
                reason,
            })?;
        self.bounded(
            "start container",
            self.docker
                .start_container(&created.id, None::<StartContainerOptions>),
        )
        .await
        .map_err(|reason| RuntimeError::RunFailure {
            service: name.clone(),
            reason,
        })?;
        self.inspect_container(name).await
    }
}
