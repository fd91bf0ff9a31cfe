use crate::docker::{ContainerRuntime, HostEnvironment, NetworkHandle};
use crate::error::{Error, Result};
use crate::lifecycle::{Fixture, FixtureContext};
use crate::names;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Prefix used when neither a name nor a prefix is configured.
pub const DEFAULT_NAME_PREFIX: &str = "test";

struct Attached {
    handle: NetworkHandle,
    /// Created by this fixture, as opposed to joined.
    owned: bool,
    host: HostEnvironment,
    runtime: Arc<dyn ContainerRuntime>,
}

/// A container network other fixtures attach to.
///
/// When the tests themselves run inside a container and `HOST_NETWORK_NAME`
/// names an existing network, that network is joined and left alone on
/// teardown. Otherwise a fresh network is created and removed on teardown.
pub struct DockerNetwork {
    name: RwLock<Option<String>>,
    prefix: RwLock<Option<String>>,
    attached: RwLock<Option<Attached>>,
}

impl DockerNetwork {
    pub fn new() -> Self {
        DockerNetwork {
            name: RwLock::new(None),
            prefix: RwLock::new(None),
            attached: RwLock::new(None),
        }
    }

    /// Use exactly `name` for the network.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        *self.name.write() = Some(name.into());
        self
    }

    /// Generate `<prefix>_<random name>`. The prefix also becomes the
    /// default database name of Postgres fixtures on this network.
    pub fn with_prefix(self, prefix: impl Into<String>) -> Self {
        *self.prefix.write() = Some(prefix.into());
        self
    }

    /// Network name; generated during setup unless configured.
    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    /// Configured prefix, else the configured name, else `test`.
    pub fn prefix(&self) -> String {
        if let Some(prefix) = self.prefix.read().clone().filter(|p| !p.is_empty()) {
            return prefix;
        }
        self.name
            .read()
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_NAME_PREFIX.to_string())
    }

    /// Runtime view of the network as of setup.
    pub fn handle(&self) -> Result<NetworkHandle> {
        self.with_attached(|a| a.handle.clone())
    }

    /// Where the test process runs relative to this network.
    pub fn host(&self) -> Result<HostEnvironment> {
        self.with_attached(|a| a.host.clone())
    }

    pub fn runtime(&self) -> Result<Arc<dyn ContainerRuntime>> {
        self.with_attached(|a| a.runtime.clone())
    }

    /// True when the network was joined rather than created.
    pub fn is_external(&self) -> Result<bool> {
        self.with_attached(|a| !a.owned)
    }

    fn with_attached<T>(&self, f: impl FnOnce(&Attached) -> T) -> Result<T> {
        match self.attached.read().as_ref() {
            Some(attached) => Ok(f(attached)),
            None => Err(Error::Config(format!(
                "network '{}' is not set up",
                self.name().unwrap_or_default()
            ))),
        }
    }

    async fn join_or_create(
        &self,
        ctx: &FixtureContext,
        host: &HostEnvironment,
        name: &str,
    ) -> Result<(NetworkHandle, bool)> {
        let runtime = ctx.runtime();
        let external = host
            .inside_container
            .then(|| ctx.environment().host_network_name.clone())
            .flatten();

        match external {
            Some(external) => {
                let mut networks = runtime.list_networks(&external).await?;
                if networks.len() != 1 {
                    return Err(Error::Environment(format!(
                        "list networks for '{}' returned {} results, expected only 1",
                        external,
                        networks.len()
                    )));
                }
                let network = networks.remove(0);
                tracing::debug!("Joined existing network '{}'", network.name);
                Ok((network, false))
            }
            None => {
                let network = runtime.create_network(name).await?;
                tracing::debug!("Created network '{}' ({})", network.name, network.id);
                Ok((network, true))
            }
        }
    }
}

impl Default for DockerNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fixture for DockerNetwork {
    fn kind(&self) -> &'static str {
        "network"
    }

    async fn set_up(&self, ctx: &FixtureContext) -> Result<()> {
        let name = match self.name() {
            Some(name) if !name.is_empty() => name,
            _ => {
                let name = names::prefixed_name(&self.prefix());
                *self.name.write() = Some(name.clone());
                name
            }
        };

        let host = HostEnvironment::detect()?;

        if let Err(e) = ctx.runtime().prune_expired().await {
            tracing::debug!("Skipping expired container cleanup: {}", e);
        }

        let (handle, owned) = self.join_or_create(ctx, &host, &name).await?;
        *self.attached.write() = Some(Attached {
            handle,
            owned,
            host,
            runtime: ctx.runtime().clone(),
        });
        Ok(())
    }

    async fn tear_down(&self, ctx: &FixtureContext) -> Result<()> {
        let target = self
            .attached
            .read()
            .as_ref()
            .filter(|a| a.owned)
            .map(|a| a.handle.id.clone());
        // Joined networks carry the test container itself; never remove them.
        if let Some(id) = target {
            // One-shot containers are removed in the background and may
            // still hold an endpoint.
            ctx.cleanups().wait().await;
            ctx.runtime().remove_network(&id).await?;
        }
        Ok(())
    }
}
