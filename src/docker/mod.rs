//! Container runtime collaborator.
//!
//! Fixtures talk to the runtime through [`ContainerRuntime`]; [`DockerClient`]
//! is the production implementation over the `docker` CLI.

pub mod client;
pub mod error;
pub mod runtime;
pub mod topology;

pub use client::DockerClient;
pub use error::DockerError;
pub use runtime::{
    ContainerHandle, ContainerRuntime, Endpoint, NetworkHandle, NetworkMember, RunSpec,
};
pub use topology::{HostEnvironment, LOOPBACK_HOST};

use std::path::Path;

/// True when this process runs inside a Docker container.
pub fn running_inside_container() -> bool {
    Path::new("/.dockerenv").exists()
}
