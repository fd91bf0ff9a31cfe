use super::{ConnectOptions, Postgres};
use crate::error::Result;
use crate::lifecycle::{Fixture, FixtureContext};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_postgres::Client;

/// A database loaded from a glob of SQL files.
///
/// By default the schema goes into the server's primary database. With
/// [`PostgresWithSchema::create_database`] a fresh database is created first
/// and dropped again on teardown.
pub struct PostgresWithSchema {
    postgres: Arc<Postgres>,
    path_glob: String,
    database: Option<String>,
    skip_tear_down: bool,
}

impl PostgresWithSchema {
    pub fn new(postgres: Arc<Postgres>, path_glob: impl Into<String>) -> Self {
        PostgresWithSchema {
            postgres,
            path_glob: path_glob.into(),
            database: None,
            skip_tear_down: false,
        }
    }

    /// Load into a new database called `name` instead of the primary one.
    pub fn create_database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    /// Leave the database in place on teardown; an enclosing fixture owns it.
    pub fn skip_tear_down(mut self) -> Self {
        self.skip_tear_down = true;
        self
    }

    pub fn postgres(&self) -> &Arc<Postgres> {
        &self.postgres
    }

    /// Name of the database holding the schema.
    pub fn database(&self) -> Result<String> {
        match &self.database {
            Some(name) => Ok(name.clone()),
            None => Ok(self.postgres.connection_settings()?.database),
        }
    }

    pub async fn connect(&self) -> Result<Client> {
        self.postgres
            .connect(ConnectOptions::database(self.database()?))
            .await
    }
}

#[async_trait]
impl Fixture for PostgresWithSchema {
    fn kind(&self) -> &'static str {
        "postgres-schema"
    }

    async fn set_up(&self, _ctx: &FixtureContext) -> Result<()> {
        if let Some(name) = &self.database {
            self.postgres.create_database(name).await?;
        }
        self.postgres
            .load_sql_pattern_into(self.database.as_deref(), &self.path_glob)
            .await
    }

    async fn tear_down(&self, _ctx: &FixtureContext) -> Result<()> {
        if self.skip_tear_down {
            return Ok(());
        }
        match &self.database {
            Some(name) => self.postgres.drop_database(name).await,
            // The primary database goes away with the server container.
            None => Ok(()),
        }
    }
}
