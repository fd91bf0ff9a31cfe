use super::{Postgres, POSTGRES_PORT};
use crate::docker::RunSpec;
use crate::error::{Error, Result};
use crate::fixtures::command::{run_to_completion, RunOptions};
use std::path::Path;

pub const PSQL_REPO: &str = "governmentpaas/psql";
pub const PSQL_TAG: &str = "latest";

/// A one-shot Postgres client command (`psql`, `createdb`, `pg_dump`...).
///
/// Runs in a client container on the fixture network with `PG*` variables
/// pointing at the server, so the command line needs no connection flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsqlInvocation {
    pub cmd: Vec<String>,
    pub mounts: Vec<String>,
    /// Report a non-zero exit through the exit code instead of an error.
    pub quiet: bool,
    /// `PGDATABASE` override; the primary database otherwise.
    pub database: Option<String>,
}

impl PsqlInvocation {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PsqlInvocation {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn mount(mut self, host: &Path, container: &str) -> Self {
        self.mounts.push(format!("{}:{}", host.display(), container));
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl Postgres {
    /// Run a client command against the server and return its exit code.
    ///
    /// A non-zero exit fails with the client container's logs unless the
    /// invocation is quiet. The client container is removed in the
    /// background, except that failed ones are kept in debug mode.
    pub async fn psql(&self, invocation: PsqlInvocation) -> Result<i64> {
        let host_ip = self.host_ip()?;
        let (settings, network, runtime, cleanups, debug) = self.with_running(|r| {
            (
                r.settings.clone(),
                r.network.name.clone(),
                r.runtime.clone(),
                r.cleanups.clone(),
                r.debug,
            )
        })?;
        let database = invocation.database.unwrap_or(settings.database);

        let mut spec = RunSpec::new(PSQL_REPO, PSQL_TAG)
            .env("PGUSER", settings.user)
            .env("PGPASSWORD", settings.password)
            .env("PGDATABASE", database)
            .env("PGHOST", host_ip)
            .env("PGPORT", POSTGRES_PORT)
            .network(network)
            .mounts(&invocation.mounts)
            .cmd(invocation.cmd);
        spec.publish_all = false;

        let options = RunOptions {
            quiet: invocation.quiet,
            keep_failed: debug,
            keep: debug && self.skip_tear_down,
        };
        match run_to_completion(&runtime, &cleanups, &spec, options).await {
            Ok(output) => Ok(output.exit_code),
            Err(Error::CommandFailed {
                command,
                exit_code,
                logs,
            }) => Err(Error::CommandFailed {
                command: format!("psql: {}", command),
                exit_code,
                logs,
            }),
            Err(e) => Err(e),
        }
    }

    /// Run an empty statement through `psql`.
    pub async fn ping_psql(&self) -> Result<()> {
        self.psql(PsqlInvocation::new(["psql", "-c", ";"]))
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_builders() {
        let inv = PsqlInvocation::new(["pg_isready"])
            .quiet()
            .database("other")
            .mount(Path::new("/data/schema"), "/tmp");
        assert_eq!(inv.cmd, ["pg_isready"]);
        assert!(inv.quiet);
        assert_eq!(inv.database.as_deref(), Some("other"));
        assert_eq!(inv.mounts, ["/data/schema:/tmp"]);
    }
}
