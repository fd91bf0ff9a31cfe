//! Throwaway Postgres servers in containers.

mod copy;
mod introspect;
mod psql;
mod schema;
mod settings;

pub use copy::PostgresDatabaseCopy;
pub use psql::PsqlInvocation;
pub use schema::PostgresWithSchema;
pub use settings::ConnectionSettings;

use super::DockerNetwork;
use crate::docker::{ContainerHandle, ContainerRuntime, HostEnvironment, NetworkHandle, RunSpec};
use crate::error::{Error, Result};
use crate::lifecycle::{CleanupSet, Fixture, FixtureContext};
use crate::names;
use crate::readiness::{port_not_mapped, ProbeStatus, ReadinessPoller, ReadinessTarget};
use crate::util;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::Client;

pub const DEFAULT_POSTGRES_REPO: &str = "postgres";
pub const DEFAULT_POSTGRES_VERSION: &str = "13-alpine";
/// Hard lifetime of the server container.
pub const DEFAULT_EXPIRE_AFTER: Duration = Duration::from_secs(600);
/// Port the server listens on inside its container.
pub const POSTGRES_PORT: &str = "5432";

/// Non-durability settings; these databases are thrown away.
fn tuning_flags(memory_mb: u64) -> Vec<String> {
    let eighth = (memory_mb / 8).max(1);
    [
        "fsync=off".to_string(),
        "synchronous_commit=off".to_string(),
        "full_page_writes=off".to_string(),
        "random_page_cost=1.1".to_string(),
        format!("shared_buffers={}MB", eighth),
        format!("work_mem={}MB", eighth),
    ]
    .into_iter()
    .flat_map(|flag| ["-c".to_string(), flag])
    .collect()
}

/// Options for [`Postgres::connect`].
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Database to connect to instead of the primary one.
    pub database: Option<String>,
    /// Role assumed with `SET ROLE` after connecting.
    pub role: Option<String>,
    /// Clone the target database under a random name and connect to the copy.
    pub create_copy: bool,
}

impl ConnectOptions {
    pub fn database(database: impl Into<String>) -> Self {
        ConnectOptions {
            database: Some(database.into()),
            ..Default::default()
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn create_copy(mut self) -> Self {
        self.create_copy = true;
        self
    }
}

struct Running {
    container: ContainerHandle,
    network: NetworkHandle,
    host: HostEnvironment,
    settings: ConnectionSettings,
    runtime: Arc<dyn ContainerRuntime>,
    cleanups: CleanupSet,
    debug: bool,
}

/// A Postgres server in a container attached to a [`DockerNetwork`].
///
/// Setup starts the server with non-durability flags and a hard container
/// lifetime, then polls until it accepts connections.
pub struct Postgres {
    network: Arc<DockerNetwork>,
    repo: String,
    version: String,
    settings: Option<ConnectionSettings>,
    expire_after: Duration,
    readiness_timeout: Option<Duration>,
    skip_tear_down: bool,
    mounts: Vec<String>,
    running: RwLock<Option<Running>>,
}

impl Postgres {
    pub fn new(network: Arc<DockerNetwork>) -> Self {
        Postgres {
            network,
            repo: DEFAULT_POSTGRES_REPO.to_string(),
            version: DEFAULT_POSTGRES_VERSION.to_string(),
            settings: None,
            expire_after: DEFAULT_EXPIRE_AFTER,
            readiness_timeout: None,
            skip_tear_down: false,
            mounts: Vec::new(),
            running: RwLock::new(None),
        }
    }

    pub fn repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Credentials and database name. Host and port are always resolved at
    /// setup.
    pub fn settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Kill the container after this long even if the test process dies.
    pub fn expire_after(mut self, expire_after: Duration) -> Self {
        self.expire_after = expire_after;
        self
    }

    /// How long to wait for the server to accept connections. Defaults to
    /// the manager's readiness timeout.
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    /// Leave the container running on teardown; something else owns it.
    pub fn skip_tear_down(mut self) -> Self {
        self.skip_tear_down = true;
        self
    }

    /// `host_path:container_path` bind mounts for the server container.
    pub fn mounts(mut self, mounts: Vec<String>) -> Self {
        self.mounts = mounts;
        self
    }

    pub fn network(&self) -> &Arc<DockerNetwork> {
        &self.network
    }

    /// Connection settings reachable from the test process.
    pub fn connection_settings(&self) -> Result<ConnectionSettings> {
        self.with_running(|r| r.settings.clone())
    }

    /// Container name of the server.
    pub fn host_name(&self) -> Result<String> {
        self.with_running(|r| r.container.name.clone())
    }

    /// Address of the server inside the fixture network.
    pub fn host_ip(&self) -> Result<String> {
        self.with_running(|r| r.container.ip_in(&r.network.name).map(str::to_string))?
            .ok_or_else(|| {
                Error::Config("postgres container is not attached to its network".to_string())
            })
    }

    fn with_running<T>(&self, f: impl FnOnce(&Running) -> T) -> Result<T> {
        match self.running.read().as_ref() {
            Some(running) => Ok(f(running)),
            None => Err(Error::Config("postgres fixture is not set up".to_string())),
        }
    }

    fn default_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            user: "postgres".to_string(),
            password: names::generate_string(),
            database: self.network.prefix(),
            disable_ssl: true,
            ..Default::default()
        }
    }

    fn run_spec(&self, network: &str, settings: &ConnectionSettings) -> RunSpec {
        RunSpec::new(&self.repo, &self.version)
            .env("POSTGRES_USER", &settings.user)
            .env("POSTGRES_PASSWORD", &settings.password)
            .env("POSTGRES_DB", &settings.database)
            .network(network)
            .cmd(tuning_flags(util::memory_mb()))
            .mounts(&self.mounts)
            .max_lifetime(self.expire_after)
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connect to the server.
    pub async fn connect(&self, options: ConnectOptions) -> Result<Client> {
        let primary = self.connection_settings()?;
        let mut settings = match options.database.as_deref().filter(|d| !d.is_empty()) {
            Some(database) => primary.with_database(database),
            None => primary,
        };

        if options.create_copy {
            let copy = names::random_name();
            self.copy_database(options.database.as_deref(), &copy).await?;
            settings = settings.with_database(copy);
        }

        let client = settings.connect().await?;
        if let Some(role) = options.role.as_deref().filter(|r| !r.is_empty()) {
            client
                .batch_execute(&format!("SET ROLE {}", quote_ident(role)))
                .await
                .map_err(|e| {
                    Error::Config(format!("failed to assume role '{}': {}", role, e))
                })?;
        }
        Ok(client)
    }

    /// Connect to the primary database and run a trivial query.
    pub async fn ping(&self) -> Result<()> {
        self.connect(ConnectOptions::default()).await.map(drop)
    }

    /// Wait until the server accepts connections.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
        ReadinessPoller::new(timeout)
            .wait(&Readiness { postgres: self })
            .await
    }

    // ------------------------------------------------------------------
    // Database operations
    // ------------------------------------------------------------------

    pub async fn create_database(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Config("must provide a database name".to_string()));
        }
        let output = self
            .psql(PsqlInvocation::new(["createdb", "--template=template0", name]))
            .await?;
        tracing::debug!(status = output, database = name, "create database");
        Ok(())
    }

    /// `createdb --template=<source> <target>`; `source` defaults to the
    /// primary database.
    pub async fn copy_database(&self, source: Option<&str>, target: &str) -> Result<()> {
        let source = match source.filter(|s| !s.is_empty()) {
            Some(source) => source.to_string(),
            None => self.connection_settings()?.database,
        };
        let template = format!("--template={}", source);
        let output = self
            .psql(PsqlInvocation::new(["createdb", template.as_str(), target]))
            .await?;
        tracing::debug!(status = output, source = %source, target = target, "copy database");
        Ok(())
    }

    /// Drop `name`, first refusing new connections and terminating open ones.
    pub async fn drop_database(&self, name: &str) -> Result<()> {
        {
            let client = self.connect(ConnectOptions::database(name)).await?;
            client
                .batch_execute(&format!(
                    "REVOKE CONNECT ON DATABASE {} FROM public",
                    quote_ident(name)
                ))
                .await?;
            client
                .batch_execute(
                    "SELECT pid, pg_terminate_backend(pid) FROM pg_stat_activity \
                     WHERE datname = current_database() AND pid <> pg_backend_pid()",
                )
                .await?;
        }
        let output = self.psql(PsqlInvocation::new(["dropdb", name])).await?;
        tracing::debug!(status = output, database = name, "drop database");
        Ok(())
    }

    /// `pg_dump -Fc` of the primary database into `<dir>/<filename>`, where
    /// `dir` is looked up from the working directory upwards.
    pub async fn dump(&self, dir: &str, filename: &str) -> Result<()> {
        let path = resolve_dir(dir)?;
        let database = self.connection_settings()?.database;
        let script = format!("pg_dump -Fc -Z0 {} > /tmp/{}", database, filename);
        let output = self
            .psql(PsqlInvocation::new(["sh", "-c", script.as_str()]).mount(&path, "/tmp"))
            .await?;
        tracing::debug!(status = output, database = %database, path = %path.display(), "dump database");
        Ok(())
    }

    /// Restore a dump written by [`Postgres::dump`] into the primary database.
    pub async fn restore(&self, dir: &str, filename: &str) -> Result<()> {
        let path = resolve_dir(dir)?;
        let database = self.connection_settings()?.database;
        let script = format!(
            "pg_restore --dbname={} --verbose --single-transaction /tmp/{}",
            database, filename
        );
        let output = self
            .psql(PsqlInvocation::new(["sh", "-c", script.as_str()]).mount(&path, "/tmp"))
            .await?;
        tracing::debug!(status = output, database = %database, path = %path.display(), "restore database");
        Ok(())
    }

    /// Run a `.sql` file, or every `*.sql` file in a directory, against the
    /// primary database.
    pub async fn load_sql(&self, path: impl AsRef<Path>) -> Result<()> {
        self.load_sql_into(None, path).await
    }

    /// [`Postgres::load_sql`] against `database` (the primary one if `None`).
    pub async fn load_sql_into(&self, database: Option<&str>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return self.load_sql_file(database, path).await;
        }
        let pattern = path.join("*.sql");
        for file in sorted_glob(&pattern.to_string_lossy())? {
            self.load_sql_file(database, &file).await?;
        }
        Ok(())
    }

    /// Load every file matching a glob pattern, in lexical order.
    pub async fn load_sql_pattern(&self, pattern: &str) -> Result<()> {
        self.load_sql_pattern_into(None, pattern).await
    }

    pub async fn load_sql_pattern_into(&self, database: Option<&str>, pattern: &str) -> Result<()> {
        for path in sorted_glob(pattern)? {
            self.load_sql_into(database, &path).await?;
        }
        Ok(())
    }

    async fn load_sql_file(&self, database: Option<&str>, file: &Path) -> Result<()> {
        let absolute = std::fs::canonicalize(file)?;
        let (Some(dir), Some(name)) = (absolute.parent(), absolute.file_name()) else {
            return Err(Error::Config(format!("not a file: {}", file.display())));
        };
        let name = name.to_string_lossy();
        let arg = format!("--file=/tmp/{}", name);
        let mut invocation = PsqlInvocation::new(["psql", arg.as_str()]).mount(dir, "/tmp");
        if let Some(database) = database {
            invocation = invocation.database(database);
        }
        let output = self.psql(invocation).await?;
        tracing::debug!(status = output, name = %name, "load sql");
        Ok(())
    }
}

fn resolve_dir(dir: &str) -> Result<PathBuf> {
    util::find_path(dir).ok_or_else(|| Error::Config(format!("could not resolve path: {}", dir)))
}

fn sorted_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => tracing::warn!("Skipping unreadable path {}: {}", e.path().display(), e),
        }
    }
    paths.sort();
    Ok(paths)
}

/// Double-quote an SQL identifier.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Readiness adapter: port lookup, `pg_isready`, then a real connection.
struct Readiness<'a> {
    postgres: &'a Postgres,
}

#[async_trait]
impl ReadinessTarget for Readiness<'_> {
    fn kind(&self) -> &str {
        "postgres"
    }

    async fn resolve_port(&self) -> Result<String> {
        let (runtime, id, host, network) = self.postgres.with_running(|r| {
            (
                r.runtime.clone(),
                r.container.id.clone(),
                r.host.clone(),
                r.network.clone(),
            )
        })?;

        // Port bindings can show up after `docker run` returns.
        let container = runtime.inspect_container(&id).await?;
        let port = host
            .container_tcp_port(&container, &network, POSTGRES_PORT)
            .ok_or_else(|| port_not_mapped(&container.name, POSTGRES_PORT))?;

        if let Some(running) = self.postgres.running.write().as_mut() {
            running.container = container;
            running.settings.port = port.clone();
        }
        Ok(port)
    }

    async fn probe(&self, _port: &str) -> Result<ProbeStatus> {
        let code = self
            .postgres
            .psql(PsqlInvocation::new(["pg_isready"]).quiet())
            .await?;
        Ok(ProbeStatus::from_exit_code(code))
    }

    async fn confirm(&self, _port: &str) -> Result<()> {
        let client = self.postgres.connection_settings()?.connect().await?;
        drop(client);
        Ok(())
    }
}

#[async_trait]
impl Fixture for Postgres {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn set_up(&self, ctx: &FixtureContext) -> Result<()> {
        let network = self.network.handle()?;
        let host = self.network.host()?;
        let mut settings = self.settings.clone().unwrap_or_else(|| self.default_settings());

        let spec = self.run_spec(&network.name, &settings);
        let container = ctx.runtime().run_container(&spec).await?;
        settings.host = host.container_address(&container, &network);

        tracing::debug!(
            container = %container.name,
            id = %container.short_id(),
            host = %settings.host,
            database = %settings.database,
            "postgres container started"
        );

        *self.running.write() = Some(Running {
            container,
            network,
            host,
            settings,
            runtime: ctx.runtime().clone(),
            cleanups: ctx.cleanups().clone(),
            debug: ctx.debug(),
        });

        let timeout = self.readiness_timeout.unwrap_or(ctx.readiness_timeout());
        ReadinessPoller::new(timeout)
            .cancel_on(ctx.cancellation_token().clone())
            .wait(&Readiness { postgres: self })
            .await
    }

    async fn tear_down(&self, ctx: &FixtureContext) -> Result<()> {
        if self.skip_tear_down {
            return Ok(());
        }
        let container = self.running.read().as_ref().map(|r| r.container.clone());
        // Removed inline: the network behind it goes next and refuses to
        // leave while the server is still attached.
        if let Some(container) = container {
            tracing::debug!(container = %container.name, "removing postgres container");
            ctx.runtime().remove_container(&container.id).await?;
        }
        Ok(())
    }
}


impl std::fmt::Debug for Postgres {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Postgres")
            .field("repo", &self.repo)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
