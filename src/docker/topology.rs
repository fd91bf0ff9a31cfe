//! Address and port resolution across runtime topologies.
//!
//! The same test suite runs on a developer machine, in a CI container that is
//! attached to the fixture network, and in a CI container that is not. Each
//! case reaches a fixture container differently:
//!
//! | test process               | address             | port        |
//! | -------------------------- | ------------------- | ----------- |
//! | container, bridge-attached | in-network IP       | internal    |
//! | container, not attached    | gateway             | host-mapped |
//! | host                       | `localhost`         | host-mapped |

use super::runtime::{ContainerHandle, NetworkHandle};
use crate::error::{Error, Result};

/// Address used to reach published ports from the host.
pub const LOOPBACK_HOST: &str = "localhost";

/// Where the test process itself is running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    pub inside_container: bool,
    /// Own hostname, only looked up when running inside a container. Docker
    /// sets it to the container name or short id.
    pub hostname: Option<String>,
}

impl HostEnvironment {
    /// Plain host process, not containerized.
    pub fn host() -> Self {
        Self::default()
    }

    /// Containerized process with the given hostname.
    pub fn container(hostname: impl Into<String>) -> Self {
        Self {
            inside_container: true,
            hostname: Some(hostname.into()),
        }
    }

    /// Detect the current process's environment.
    ///
    /// A hostname that cannot be read while inside a container is an
    /// [`Error::Environment`]: bridge detection is impossible and the
    /// environment is unusable for testing.
    pub fn detect() -> Result<Self> {
        if !super::running_inside_container() {
            return Ok(Self::host());
        }
        let hostname = hostname::get()
            .map_err(|e| Error::Environment(format!("could not read hostname: {}", e)))?
            .into_string()
            .map_err(|raw| {
                Error::Environment(format!("hostname is not valid UTF-8: {:?}", raw))
            })?;
        Ok(Self::container(hostname))
    }

    /// True when this process is a member of `network`.
    pub fn uses_bridge_network(&self, network: &NetworkHandle) -> bool {
        if !self.inside_container {
            return false;
        }
        match self.hostname.as_deref() {
            Some(hostname) => network
                .members
                .iter()
                .any(|m| m.name == hostname || hostname_matches_id(hostname, &m.name)),
            None => false,
        }
    }

    /// Host the test process should connect to for `container`.
    pub fn container_address(&self, container: &ContainerHandle, network: &NetworkHandle) -> String {
        if self.uses_bridge_network(network) {
            if let Some(ip) = container.ip_in(&network.name) {
                return ip.to_string();
            }
        }
        if self.inside_container {
            if let Some(gateway) = container.gateway.as_deref().filter(|g| !g.is_empty()) {
                return gateway.to_string();
            }
            if let Some(endpoint) = container.networks.get(&network.name) {
                if !endpoint.gateway.is_empty() {
                    return endpoint.gateway.clone();
                }
            }
            if let Some(gateway) = network.gateway.as_deref() {
                return gateway.to_string();
            }
        }
        LOOPBACK_HOST.to_string()
    }

    /// Port the test process should connect to for `port/tcp` on `container`.
    ///
    /// `None` when the runtime has not published the port yet.
    pub fn container_tcp_port(
        &self,
        container: &ContainerHandle,
        network: &NetworkHandle,
        port: &str,
    ) -> Option<String> {
        if self.uses_bridge_network(network) {
            return Some(port.to_string());
        }
        container.host_port(port).map(str::to_string)
    }
}

// Docker's default hostname is the 12 character short id, not the name.
fn hostname_matches_id(hostname: &str, member: &str) -> bool {
    hostname.len() == 12 && member.starts_with(hostname)
}
