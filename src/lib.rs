#![allow(unused_assignments)]

//! # Fixtures
//!
//! Ordered setup and teardown of external test dependencies: container
//! networks, throwaway Postgres servers, databases loaded from SQL files and
//! per-test database copies.
//!
//! ## Features
//!
//! - **Ordered lifecycle**: fixtures are set up as they are added and torn down in reverse
//! - **Panic safety**: [`Fixtures::recover_tear_down`] cleans up before resuming a panic
//! - **Cleanup barrier**: teardown waits for every background container removal
//! - **Readiness polling**: bounded exponential backoff until a server accepts connections
//! - **Topology aware**: the same tests run on a laptop, in a CI container attached to the
//!   fixture network, or in one that is not
//! - **Orphan protection**: server containers carry a hard lifetime and remove themselves
//!
//! ## Quick Start
//!
//! ```no_run
//! use fixtures::{ConnectOptions, DockerNetwork, Fixtures, Postgres};
//!
//! # async fn example() -> fixtures::Result<()> {
//! fixtures::logging::init(&fixtures::Environment::from_env());
//! let fixtures = Fixtures::from_env();
//!
//! fixtures
//!     .recover_tear_down(async {
//!         let network = fixtures
//!             .add_by_name("network", DockerNetwork::new().with_prefix("myapp"))
//!             .await?;
//!         let db = fixtures.add_by_name("db", Postgres::new(network)).await?;
//!         db.load_sql_pattern("./testdata/migrations/*.sql").await?;
//!
//!         let client = db.connect(ConnectOptions::default()).await?;
//!         client.simple_query("SELECT 1").await?;
//!         fixtures::Result::Ok(())
//!     })
//!     .await?;
//!
//! fixtures.tear_down().await
//! # }
//! ```

pub mod config;
pub mod docker;
pub mod error;
pub mod fixtures;
pub mod lifecycle;
pub mod logging;
pub mod names;
pub mod readiness;
pub mod retry;
pub mod util;

// Re-export commonly used types
pub use config::Environment;
pub use docker::{ContainerRuntime, DockerClient, DockerError, HostEnvironment};
pub use error::{Error, Result};
pub use fixtures::{
    ConnectOptions, ConnectionSettings, ContainerCommand, DockerNetwork, Postgres,
    PostgresDatabaseCopy, PostgresWithSchema, PsqlInvocation,
};
pub use lifecycle::{CleanupSet, Fixture, FixtureContext, FixtureState, Fixtures, FixturesBuilder};
pub use readiness::{ProbeStatus, ReadinessPoller, ReadinessTarget};
pub use retry::{retry, Backoff, Retry};
