use super::DockerNetwork;
use crate::docker::{ContainerHandle, ContainerRuntime, RunSpec};
use crate::error::{Error, Result};
use crate::lifecycle::{CleanupSet, Fixture, FixtureContext};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Result of a one-shot container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i64,
    pub container_name: String,
    pub container_id: String,
}

/// How a one-shot container run should be treated.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunOptions {
    /// A non-zero exit is reported through the exit code, not as an error.
    pub quiet: bool,
    /// Leave failed containers behind for inspection.
    pub keep_failed: bool,
    /// Leave the container behind even on success.
    pub keep: bool,
}

/// Run `spec` to completion, then remove the container in the background.
///
/// A non-zero exit (unless quiet) fails with [`Error::CommandFailed`]
/// carrying the container logs.
pub(crate) async fn run_to_completion(
    runtime: &Arc<dyn ContainerRuntime>,
    cleanups: &CleanupSet,
    spec: &RunSpec,
    options: RunOptions,
) -> Result<CommandOutput> {
    let container = runtime.run_container(spec).await?;
    let command = spec.cmd.join(" ");

    let exit_code = match runtime.wait_container(&container.id).await {
        Ok(code) => code,
        Err(e) => {
            purge(runtime, cleanups, &container);
            return Err(Error::from(e));
        }
    };

    if exit_code != 0 && !options.quiet {
        let logs = runtime
            .logs(&container.id)
            .await
            .unwrap_or_else(|e| format!("<failed to read logs: {}>", e));
        tracing::debug!(
            status = exit_code,
            container_name = %container.name,
            container_id = %container.short_id(),
            cmd = %command,
            "one-shot container failed"
        );
        if options.keep_failed {
            tracing::debug!("Keeping container '{}' for inspection", container.name);
        } else {
            purge(runtime, cleanups, &container);
        }
        return Err(Error::CommandFailed {
            command,
            exit_code,
            logs,
        });
    }

    if !options.keep {
        purge(runtime, cleanups, &container);
    }
    Ok(CommandOutput {
        exit_code,
        container_id: container.short_id().to_string(),
        container_name: container.name,
    })
}

/// Remove `container` through the cleanup set.
pub(crate) fn purge(runtime: &Arc<dyn ContainerRuntime>, cleanups: &CleanupSet, container: &ContainerHandle) {
    let runtime = runtime.clone();
    let id = container.id.clone();
    cleanups.spawn(format!("remove container {}", container.name), async move {
        runtime.remove_container(&id).await.map_err(Error::from)
    });
}

/// Runs a one-shot container on a network during setup, and optionally
/// another one during teardown. Seeds data, runs migrations, and the like.
pub struct ContainerCommand {
    network: Arc<DockerNetwork>,
    spec: RunSpec,
    tear_down_cmd: Option<Vec<String>>,
    output: RwLock<Option<CommandOutput>>,
}

impl ContainerCommand {
    pub fn new(network: Arc<DockerNetwork>, repository: impl Into<String>, tag: impl Into<String>) -> Self {
        let mut spec = RunSpec::new(repository, tag);
        spec.publish_all = false;
        ContainerCommand {
            network,
            spec,
            tear_down_cmd: None,
            output: RwLock::new(None),
        }
    }

    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec = self.spec.cmd(cmd);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec = self.spec.env(key, value);
        self
    }

    pub fn mounts(mut self, mounts: &[String]) -> Self {
        self.spec = self.spec.mounts(mounts);
        self
    }

    /// Command run in the same image during teardown.
    pub fn tear_down_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tear_down_cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    /// Outcome of the setup command.
    pub fn output(&self) -> Option<CommandOutput> {
        self.output.read().clone()
    }

    fn spec_for(&self, cmd: Option<&[String]>) -> Result<RunSpec> {
        let mut spec = self.spec.clone();
        spec.networks = vec![self.network.handle()?.name];
        if let Some(cmd) = cmd {
            spec.cmd = cmd.to_vec();
        }
        Ok(spec)
    }
}

#[async_trait]
impl Fixture for ContainerCommand {
    fn kind(&self) -> &'static str {
        "command"
    }

    async fn set_up(&self, ctx: &FixtureContext) -> Result<()> {
        let spec = self.spec_for(None)?;
        let options = RunOptions {
            keep_failed: ctx.debug(),
            ..Default::default()
        };
        let output = run_to_completion(ctx.runtime(), ctx.cleanups(), &spec, options).await?;
        *self.output.write() = Some(output);
        Ok(())
    }

    async fn tear_down(&self, ctx: &FixtureContext) -> Result<()> {
        let Some(cmd) = self.tear_down_cmd.as_deref() else {
            return Ok(());
        };
        let spec = self.spec_for(Some(cmd))?;
        run_to_completion(ctx.runtime(), ctx.cleanups(), &spec, RunOptions::default()).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ContainerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerCommand").finish_non_exhaustive()
    }
}
