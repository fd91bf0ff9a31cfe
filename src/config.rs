//! Environment configuration.

use std::env;

/// Environment variable toggling verbose lifecycle logging.
pub const DEBUG_VAR: &str = "DEBUG";
/// Environment variable naming an existing network to join when the tests
/// themselves run inside a container.
pub const HOST_NETWORK_NAME_VAR: &str = "HOST_NETWORK_NAME";

/// Settings shared by every fixture of one manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub debug: bool,
    pub host_network_name: Option<String>,
}

impl Environment {
    /// Read `DEBUG` and `HOST_NETWORK_NAME` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Environment {
            debug: lookup(DEBUG_VAR).map(|v| parse_flag(&v)).unwrap_or(false),
            host_network_name: lookup(HOST_NETWORK_NAME_VAR)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_host_network(mut self, name: impl Into<String>) -> Self {
        self.host_network_name = Some(name.into());
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
