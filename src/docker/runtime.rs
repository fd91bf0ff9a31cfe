//! The container runtime seam.
//!
//! Fixtures never shell out to `docker` directly; they go through
//! [`ContainerRuntime`] so tests can substitute an in-memory runtime and so the
//! descriptors below stay plain data that topology code can reason about.

use super::DockerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Label applied to every container and network created by this crate.
pub const MANAGED_LABEL: &str = "com.fixtures.managed";
/// Unix timestamp after which a managed container may be reaped.
pub const EXPIRES_AT_LABEL: &str = "com.fixtures.expires-at";

/// A container attached to a network, as listed by the network itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkMember {
    pub name: String,
    /// Address without the prefix length (`172.18.0.2`, not `172.18.0.2/16`).
    pub ipv4_address: String,
}

/// A container runtime network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
    pub gateway: Option<String>,
    pub members: Vec<NetworkMember>,
}

impl NetworkHandle {
    pub fn has_member(&self, container_name: &str) -> bool {
        self.members.iter().any(|m| m.name == container_name)
    }
}

/// Per-network settings of a running container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub ip_address: String,
    pub gateway: String,
}

/// A running (or exited) container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    /// Container name without the leading `/` docker reports.
    pub name: String,
    /// Default bridge gateway, empty when the container only joined user networks.
    pub gateway: Option<String>,
    pub networks: HashMap<String, Endpoint>,
    /// Container port (`5432/tcp`) to host port (`49153`).
    pub ports: HashMap<String, String>,
}

impl ContainerHandle {
    /// First eleven characters of the id, the way `docker ps` abbreviates it.
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(11);
        &self.id[..end]
    }

    /// Host port mapped to a container TCP port, if published yet.
    pub fn host_port(&self, port: &str) -> Option<&str> {
        self.ports
            .get(&format!("{}/tcp", port))
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    /// IP address of the container inside `network`, if attached.
    pub fn ip_in(&self, network: &str) -> Option<&str> {
        self.networks
            .get(network)
            .map(|e| e.ip_address.as_str())
            .filter(|ip| !ip.is_empty())
    }
}

/// Everything needed to start a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub repository: String,
    pub tag: String,
    pub name: Option<String>,
    pub env: Vec<(String, String)>,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub networks: Vec<String>,
    /// `host_path:container_path` bind mounts.
    pub mounts: Vec<String>,
    pub labels: Vec<(String, String)>,
    /// Publish every exposed port on an ephemeral host port.
    pub publish_all: bool,
    /// Hard upper bound on the container's lifetime. The runtime must stop
    /// and remove the container once it elapses, even if nobody asks it to.
    pub max_lifetime: Option<Duration>,
}

impl RunSpec {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            publish_all: true,
            ..Default::default()
        }
    }

    pub fn image(&self) -> String {
        if self.tag.is_empty() {
            self.repository.clone()
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.networks.push(network.into());
        self
    }

    pub fn mounts(mut self, mounts: &[String]) -> Self {
        self.mounts.extend(mounts.iter().cloned());
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }
}

/// Operations the fixtures need from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + std::fmt::Debug {
    /// Verify the runtime is reachable.
    async fn ping(&self) -> Result<(), DockerError>;

    async fn create_network(&self, name: &str) -> Result<NetworkHandle, DockerError>;

    /// Networks whose name is exactly `name`.
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkHandle>, DockerError>;

    /// Fresh view of a network, including its current members.
    async fn inspect_network(&self, name_or_id: &str) -> Result<NetworkHandle, DockerError>;

    async fn remove_network(&self, name_or_id: &str) -> Result<(), DockerError>;

    /// Start a container detached and return its inspected descriptor.
    async fn run_container(&self, spec: &RunSpec) -> Result<ContainerHandle, DockerError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerHandle, DockerError>;

    /// Block until the container exits and return its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, DockerError>;

    /// Combined stdout and stderr of a container.
    async fn logs(&self, id: &str) -> Result<String, DockerError>;

    /// Force-remove a container and its anonymous volumes. Succeeds if the
    /// container is already gone.
    async fn remove_container(&self, id: &str) -> Result<(), DockerError>;

    /// Remove managed containers whose [`EXPIRES_AT_LABEL`] deadline has
    /// passed. Containers started with a maximum lifetime normally remove
    /// themselves; this catches the ones left behind when the daemon was
    /// restarted. Returns how many were removed.
    async fn prune_expired(&self) -> Result<usize, DockerError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_looks_up_tcp_binding() {
        let mut c = ContainerHandle::default();
        c.ports.insert("5432/tcp".into(), "49153".into());
        assert_eq!(c.host_port("5432"), Some("49153"));
        assert_eq!(c.host_port("6379"), None);
    }

    #[test]
    fn empty_binding_counts_as_unmapped() {
        let mut c = ContainerHandle::default();
        c.ports.insert("5432/tcp".into(), String::new());
        assert_eq!(c.host_port("5432"), None);
    }

    #[test]
    fn short_id_handles_short_ids() {
        let c = ContainerHandle {
            id: "abc".into(),
            ..Default::default()
        };
        assert_eq!(c.short_id(), "abc");
        let c = ContainerHandle {
            id: "0123456789abcdef".into(),
            ..Default::default()
        };
        assert_eq!(c.short_id(), "0123456789a");
    }

    #[test]
    fn image_joins_repository_and_tag() {
        assert_eq!(RunSpec::new("postgres", "13-alpine").image(), "postgres:13-alpine");
        assert_eq!(RunSpec::new("postgres", "").image(), "postgres");
    }
}
