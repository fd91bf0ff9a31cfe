use super::{ConnectOptions, Postgres};
use crate::error::{Error, Result};
use crate::lifecycle::{Fixture, FixtureContext};
use crate::names;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_postgres::Client;

/// A template copy of an existing database, dropped on teardown.
///
/// Gives each test its own database without reloading the schema.
pub struct PostgresDatabaseCopy {
    postgres: Arc<Postgres>,
    source: Option<String>,
    name: RwLock<Option<String>>,
}

impl PostgresDatabaseCopy {
    /// Copy the server's primary database.
    pub fn new(postgres: Arc<Postgres>) -> Self {
        PostgresDatabaseCopy {
            postgres,
            source: None,
            name: RwLock::new(None),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Name of the copy; generated during setup if not set.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        *self.name.write() = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub async fn connect(&self) -> Result<Client> {
        let name = self
            .name()
            .ok_or_else(|| Error::Config("database copy is not set up".to_string()))?;
        self.postgres.connect(ConnectOptions::database(name)).await
    }
}

#[async_trait]
impl Fixture for PostgresDatabaseCopy {
    fn kind(&self) -> &'static str {
        "postgres-copy"
    }

    async fn set_up(&self, _ctx: &FixtureContext) -> Result<()> {
        let name = match self.name() {
            Some(name) if !name.is_empty() => name,
            _ => {
                let name = names::random_name();
                *self.name.write() = Some(name.clone());
                name
            }
        };
        self.postgres
            .copy_database(self.source.as_deref(), &name)
            .await
    }

    async fn tear_down(&self, _ctx: &FixtureContext) -> Result<()> {
        match self.name() {
            Some(name) => self.postgres.drop_database(&name).await,
            None => Ok(()),
        }
    }
}
