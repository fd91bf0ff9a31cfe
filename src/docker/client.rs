//! Docker CLI implementation of [`ContainerRuntime`].
//!
//! All docker interactions go through `DockerClient`, which provides
//! consistent timeout handling, error mapping to [`DockerError`], and a single
//! point where `Command::new("docker")` is constructed.

use super::runtime::{
    ContainerHandle, ContainerRuntime, Endpoint, NetworkHandle, NetworkMember, RunSpec,
    EXPIRES_AT_LABEL, MANAGED_LABEL,
};
use super::DockerError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Output;
use std::time::Duration;

// Docker operation timeouts
const DOCKER_QUICK_TIMEOUT: Duration = Duration::from_secs(10); // inspect, ls, rm
const DOCKER_RUN_TIMEOUT: Duration = Duration::from_secs(60); // run -d
const DOCKER_PULL_TIMEOUT: Duration = Duration::from_secs(300); // pull (5 minutes)
const DOCKER_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the `docker` command line.
///
/// Cheap to clone; fixtures share one behind an `Arc<dyn ContainerRuntime>`.
#[derive(Debug, Clone)]
pub struct DockerClient {
    binary: String,
}

impl DockerClient {
    pub fn new() -> Self {
        DockerClient {
            binary: "docker".to_string(),
        }
    }

    /// Use a docker-compatible binary other than `docker` (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        DockerClient {
            binary: binary.into(),
        }
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Run a docker command with a timeout, returning raw Output.
    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output, DockerError> {
        tracing::trace!(command = %self.describe(args), "docker");
        let result = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(&self.binary)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DockerError::exec_failed(self.describe(args), e)),
            Err(_) => Err(DockerError::timeout(self.describe(args), timeout)),
        }
    }

    /// Run a docker command with a timeout, returning Output only if exit 0.
    async fn run_success(&self, args: &[&str], timeout: Duration) -> Result<Output, DockerError> {
        let output = self.run(args, timeout).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(DockerError::failed(self.describe(args), &output))
        }
    }

    async fn stdout(&self, args: &[&str], timeout: Duration) -> Result<String, DockerError> {
        let output = self.run_success(args, timeout).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Pull an image unless it is already present locally.
    async fn ensure_image(&self, image: &str) -> Result<(), DockerError> {
        let present = self
            .run(&["image", "inspect", "--format", "{{.Id}}", image], DOCKER_QUICK_TIMEOUT)
            .await?
            .status
            .success();
        if present {
            tracing::trace!("Image '{}' found locally, skipping pull", image);
            return Ok(());
        }
        tracing::debug!("Pulling image '{}' (not found locally)", image);
        self.run_success(&["pull", image], DOCKER_PULL_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// Entrypoint and default command baked into an image.
    async fn image_entrypoint(&self, image: &str) -> Result<(Vec<String>, Vec<String>), DockerError> {
        let args = [
            "image",
            "inspect",
            "--format",
            "{{json .Config.Entrypoint}}\t{{json .Config.Cmd}}",
            image,
        ];
        let out = self.stdout(&args, DOCKER_QUICK_TIMEOUT).await?;
        let (entrypoint, cmd) = out
            .split_once('\t')
            .ok_or_else(|| DockerError::malformed(self.describe(&args), &out))?;
        let parse = |s: &str| -> Result<Vec<String>, DockerError> {
            serde_json::from_str::<Option<Vec<String>>>(s)
                .map(Option::unwrap_or_default)
                .map_err(|e| DockerError::malformed(self.describe(&args), e))
        };
        Ok((parse(entrypoint)?, parse(cmd)?))
    }

    /// Translate a [`RunSpec`] into `docker run` arguments.
    ///
    /// A maximum lifetime is enforced inside the container itself: the
    /// original entrypoint is wrapped in `timeout <secs>` and the container is
    /// started with `--rm`, so it exits and disappears even if the process
    /// that started it is killed.
    fn run_args(spec: &RunSpec, image_default: Option<(Vec<String>, Vec<String>)>) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];

        if let Some(ref name) = spec.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }

        args.push("--label".to_string());
        args.push(format!("{}=true", MANAGED_LABEL));
        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        // `docker run` only accepts one --network; extra networks are
        // connected after start.
        if let Some(network) = spec.networks.first() {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        for mount in &spec.mounts {
            args.push("-v".to_string());
            args.push(mount.clone());
        }

        if spec.publish_all {
            args.push("-P".to_string());
        }

        let mut entrypoint = spec.entrypoint.clone();
        let mut cmd = spec.cmd.clone();

        if let Some(lifetime) = spec.max_lifetime {
            let (image_entrypoint, image_cmd) = image_default.unwrap_or_default();
            if entrypoint.is_empty() {
                entrypoint = image_entrypoint;
            }
            if cmd.is_empty() {
                cmd = image_cmd;
            }
            let expires_at = chrono::Utc::now().timestamp() + lifetime.as_secs() as i64;
            args.push("--rm".to_string());
            args.push("--label".to_string());
            args.push(format!("{}={}", EXPIRES_AT_LABEL, expires_at));

            let mut wrapped = vec![lifetime.as_secs().max(1).to_string()];
            wrapped.extend(entrypoint);
            wrapped.extend(cmd);
            entrypoint = vec!["timeout".to_string()];
            cmd = wrapped;
        }

        if let Some((first, rest)) = entrypoint.split_first() {
            args.push("--entrypoint".to_string());
            args.push(first.clone());
            args.push(spec.image());
            args.extend(rest.iter().cloned());
        } else {
            args.push(spec.image());
        }
        args.extend(cmd);
        args
    }

    fn parse_container(command: &str, json: &str) -> Result<ContainerHandle, DockerError> {
        let mut items: Vec<ContainerInspect> =
            serde_json::from_str(json).map_err(|e| DockerError::malformed(command, e))?;
        let item = items
            .pop()
            .ok_or_else(|| DockerError::malformed(command, "empty inspect result"))?;

        let settings = item.network_settings;
        let ports = settings
            .ports
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(container_port, bindings)| {
                bindings
                    .unwrap_or_default()
                    .into_iter()
                    .find(|b| !b.host_port.is_empty())
                    .map(|b| (container_port, b.host_port))
            })
            .collect();
        let networks = settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, e)| {
                (
                    name,
                    Endpoint {
                        ip_address: e.ip_address,
                        gateway: e.gateway,
                    },
                )
            })
            .collect();

        Ok(ContainerHandle {
            id: item.id,
            name: item.name.trim_start_matches('/').to_string(),
            gateway: Some(settings.gateway).filter(|g| !g.is_empty()),
            networks,
            ports,
        })
    }

    fn parse_networks(command: &str, json: &str) -> Result<Vec<NetworkHandle>, DockerError> {
        let items: Vec<NetworkInspect> =
            serde_json::from_str(json).map_err(|e| DockerError::malformed(command, e))?;
        Ok(items
            .into_iter()
            .map(|n| NetworkHandle {
                id: n.id,
                name: n.name,
                gateway: n
                    .ipam
                    .and_then(|ipam| ipam.config)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| c.gateway)
                    .find(|g| !g.is_empty()),
                members: n
                    .containers
                    .unwrap_or_default()
                    .into_values()
                    .map(|c| NetworkMember {
                        name: c.name,
                        ipv4_address: c
                            .ipv4_address
                            .split('/')
                            .next()
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect(),
            })
            .collect())
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn ping(&self) -> Result<(), DockerError> {
        let output = self
            .run(&["info", "--format", "{{.ServerVersion}}"], DOCKER_PING_TIMEOUT)
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DockerError::DaemonUnavailable)
        }
    }

    async fn create_network(&self, name: &str) -> Result<NetworkHandle, DockerError> {
        let label = format!("{}=true", MANAGED_LABEL);
        let id = self
            .stdout(
                &["network", "create", "--label", &label, name],
                DOCKER_QUICK_TIMEOUT,
            )
            .await?;
        self.inspect_network(&id).await
    }

    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkHandle>, DockerError> {
        let filter = format!("name={}", name);
        let ids = self
            .stdout(
                &["network", "ls", "--filter", &filter, "--format", "{{.ID}}"],
                DOCKER_QUICK_TIMEOUT,
            )
            .await?;

        let mut networks = Vec::new();
        // The name filter matches substrings; keep exact matches only.
        for id in ids.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let network = self.inspect_network(id).await?;
            if network.name == name {
                networks.push(network);
            }
        }
        Ok(networks)
    }

    async fn inspect_network(&self, name_or_id: &str) -> Result<NetworkHandle, DockerError> {
        let args = ["network", "inspect", name_or_id];
        let output = self.run(&args, DOCKER_QUICK_TIMEOUT).await?;
        if !output.status.success() {
            let err = DockerError::failed(self.describe(&args), &output);
            return Err(if err.is_not_found() {
                DockerError::NotFound {
                    kind: "network",
                    name: name_or_id.to_string(),
                }
            } else {
                err
            });
        }
        let json = String::from_utf8_lossy(&output.stdout);
        Self::parse_networks(&self.describe(&args), &json)?
            .pop()
            .ok_or_else(|| DockerError::NotFound {
                kind: "network",
                name: name_or_id.to_string(),
            })
    }

    async fn remove_network(&self, name_or_id: &str) -> Result<(), DockerError> {
        let args = ["network", "rm", name_or_id];
        let output = self.run(&args, DOCKER_QUICK_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        let err = DockerError::failed(self.describe(&args), &output);
        if err.is_not_found() {
            return Ok(());
        }
        Err(err)
    }

    async fn run_container(&self, spec: &RunSpec) -> Result<ContainerHandle, DockerError> {
        let image = spec.image();
        self.ensure_image(&image).await?;

        let image_default = if spec.max_lifetime.is_some()
            && (spec.entrypoint.is_empty() || spec.cmd.is_empty())
        {
            Some(self.image_entrypoint(&image).await?)
        } else {
            None
        };

        let args = Self::run_args(spec, image_default);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let id = self.stdout(&arg_refs, DOCKER_RUN_TIMEOUT).await?;

        for network in spec.networks.iter().skip(1) {
            self.run_success(&["network", "connect", network, &id], DOCKER_QUICK_TIMEOUT)
                .await?;
        }

        self.inspect_container(&id).await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerHandle, DockerError> {
        let args = ["container", "inspect", id];
        let output = self.run(&args, DOCKER_QUICK_TIMEOUT).await?;
        if !output.status.success() {
            let err = DockerError::failed(self.describe(&args), &output);
            return Err(if err.is_not_found() {
                DockerError::NotFound {
                    kind: "container",
                    name: id.to_string(),
                }
            } else {
                err
            });
        }
        Self::parse_container(&self.describe(&args), &String::from_utf8_lossy(&output.stdout))
    }

    async fn wait_container(&self, id: &str) -> Result<i64, DockerError> {
        let args = ["wait", id];
        // No timeout beyond the caller's: one-shot containers may legitimately
        // run for a long time (restores, large schema loads).
        let output = self.run(&args, Duration::from_secs(60 * 60)).await?;
        if !output.status.success() {
            return Err(DockerError::failed(self.describe(&args), &output));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<i64>()
            .map_err(|e| DockerError::malformed(self.describe(&args), e))
    }

    async fn logs(&self, id: &str) -> Result<String, DockerError> {
        let output = self
            .run_success(&["logs", "--timestamps", id], DOCKER_QUICK_TIMEOUT)
            .await?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    async fn prune_expired(&self) -> Result<usize, DockerError> {
        let filter = format!("label={}=true", MANAGED_LABEL);
        let format = format!("{{{{.ID}}}}\t{{{{.Label \"{}\"}}}}", EXPIRES_AT_LABEL);
        let out = self
            .stdout(
                &["ps", "-a", "--filter", &filter, "--format", &format],
                DOCKER_QUICK_TIMEOUT,
            )
            .await?;

        let now = chrono::Utc::now().timestamp();
        let mut removed = 0;
        for line in out.lines() {
            let Some((id, expires_at)) = line.split_once('\t') else {
                continue;
            };
            let Ok(expires_at) = expires_at.trim().parse::<i64>() else {
                continue;
            };
            if expires_at > now {
                continue;
            }
            match self.remove_container(id).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove expired container {}: {}", id, e),
            }
        }
        if removed > 0 {
            tracing::info!("Removed {} expired container(s)", removed);
        }
        Ok(removed)
    }

    async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
        let args = ["rm", "-f", "-v", id];
        let output = self.run(&args, DOCKER_QUICK_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        let err = DockerError::failed(self.describe(&args), &output);
        if err.is_not_found() {
            return Ok(());
        }
        Err(err)
    }
}

// ============================================================================
// `docker inspect` JSON shapes (only the fields we read)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    id: String,
    name: String,
    network_settings: ContainerNetworkSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerNetworkSettings {
    #[serde(default)]
    gateway: String,
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<PortBinding>>>>,
    #[serde(default)]
    networks: Option<HashMap<String, EndpointSettings>>,
}

#[derive(Debug, Deserialize)]
struct PortBinding {
    #[serde(rename = "HostPort", default)]
    host_port: String,
}

#[derive(Debug, Deserialize)]
struct EndpointSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
    #[serde(rename = "Gateway", default)]
    gateway: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkInspect {
    id: String,
    name: String,
    #[serde(rename = "IPAM", default)]
    ipam: Option<Ipam>,
    #[serde(default)]
    containers: Option<HashMap<String, NetworkContainer>>,
}

#[derive(Debug, Deserialize)]
struct Ipam {
    #[serde(rename = "Config", default)]
    config: Option<Vec<IpamConfig>>,
}

#[derive(Debug, Deserialize)]
struct IpamConfig {
    #[serde(rename = "Gateway", default)]
    gateway: String,
}

#[derive(Debug, Deserialize)]
struct NetworkContainer {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "IPv4Address", default)]
    ipv4_address: String,
}
