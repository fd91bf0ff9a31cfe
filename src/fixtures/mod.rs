//! Concrete fixtures.
//!
//! | fixture                  | setup                                  | teardown                     |
//! | ------------------------ | -------------------------------------- | ---------------------------- |
//! | [`DockerNetwork`]        | create (or join) a network             | remove it if created         |
//! | [`ContainerCommand`]     | run a one-shot container               | optional teardown command    |
//! | [`Postgres`]             | start a server, wait until ready       | remove the container         |
//! | [`PostgresWithSchema`]   | load SQL files                         | drop the database if created |
//! | [`PostgresDatabaseCopy`] | `createdb --template`                  | revoke, terminate, drop      |

pub(crate) mod command;
mod network;
pub mod postgres;

pub use command::{CommandOutput, ContainerCommand};
pub use network::{DockerNetwork, DEFAULT_NAME_PREFIX};
pub use postgres::{
    ConnectOptions, ConnectionSettings, Postgres, PostgresDatabaseCopy, PostgresWithSchema,
    PsqlInvocation,
};
