use crate::docker::DockerError;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Docker error: {0}")]
    #[diagnostic(
        code(fixtures::docker::error),
        help("Check that Docker is running with `docker ps`")
    )]
    Docker(#[from] DockerError),

    /// The machine running the tests cannot be used (hostname unresolvable,
    /// container detection failed). Never retried.
    #[error("Test environment error: {0}")]
    #[diagnostic(code(fixtures::environment))]
    Environment(String),

    #[error("Failed to set up fixture '{name}' ({kind}): {source}")]
    #[diagnostic(code(fixtures::setup_failed))]
    SetUp {
        name: String,
        kind: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to tear down fixture '{name}' ({kind}): {source}")]
    #[diagnostic(code(fixtures::teardown_failed))]
    TearDown {
        name: String,
        kind: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Gave up waiting for {target} after {attempts} attempt(s): {source}")]
    #[diagnostic(
        code(fixtures::gave_up),
        help("The dependency may be slow to start. Increase the timeout or inspect its logs")
    )]
    GaveUp {
        target: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("{target} is not ready: ({code}) {reason}")]
    NotReady {
        target: String,
        code: i64,
        reason: String,
    },

    #[error("Could not get port {port} from container '{container}'")]
    PortNotMapped { container: String, port: String },

    #[error("'{command}' exited with code {exit_code}: {logs}")]
    #[diagnostic(code(fixtures::command_failed))]
    CommandFailed {
        command: String,
        exit_code: i64,
        logs: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Postgres error: {0}")]
    #[diagnostic(code(fixtures::postgres::error))]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the retry executor may try the failed operation again.
    ///
    /// Structural problems with the test environment (no docker binary, no
    /// daemon, unresolvable hostname, bad configuration) never fix themselves
    /// within a readiness window, so they are surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Config(_) | Error::Environment(_) | Error::Cancelled(_) => false,
            Error::Pattern(_) | Error::Validation(_) => false,
            Error::Docker(DockerError::ExecFailed { .. })
            | Error::Docker(DockerError::DaemonUnavailable) => false,
            Error::GaveUp { .. } => false,
            Error::SetUp { source, .. } | Error::TearDown { source, .. } => source.is_retryable(),
            _ => true,
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Docker(DockerError::ExecFailed { .. }) => {
                Some("Install Docker and make sure `docker` is on PATH".to_string())
            }
            Error::Docker(_) => Some("Check that Docker is running: docker ps".to_string()),
            Error::Environment(_) => Some(
                "The test environment is unusable. If running inside a container, check that its hostname resolves".to_string(),
            ),
            Error::GaveUp { target, .. } => Some(format!(
                "Check the logs of {} or raise its readiness timeout",
                target
            )),
            Error::PortNotMapped { container, .. } => Some(format!(
                "Inspect the port bindings with: docker port {}",
                container
            )),
            Error::SetUp { source, .. } | Error::TearDown { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_errors_are_not_retryable() {
        assert!(!Error::Environment("no hostname".into()).is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
        assert!(!Error::Docker(DockerError::DaemonUnavailable).is_retryable());
    }

    #[test]
    fn transient_errors_are_retryable() {
        let err = Error::NotReady {
            target: "postgres".into(),
            code: 1,
            reason: "server is rejecting connections".into(),
        };
        assert!(err.is_retryable());
        assert!(Error::PortNotMapped {
            container: "pg".into(),
            port: "5432".into()
        }
        .is_retryable());
    }

    #[test]
    fn setup_error_names_the_fixture() {
        let err = Error::SetUp {
            name: "db".into(),
            kind: "postgres".into(),
            source: Box::new(Error::Config("missing network".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("'db'"));
        assert!(msg.contains("postgres"));
        assert!(msg.contains("missing network"));
    }

    #[test]
    fn gave_up_wraps_last_error() {
        let err = Error::GaveUp {
            target: "postgres".into(),
            attempts: 3,
            source: Box::new(Error::Cancelled("x".into())),
        };
        assert!(err.to_string().starts_with("Gave up waiting for postgres"));
        assert!(err.with_suggestion().contains("Hint:"));
    }

    #[test]
    fn wrapped_docker_failure_keeps_its_hint() {
        let err = Error::TearDown {
            name: "network".into(),
            kind: "network".into(),
            source: Box::new(Error::Docker(DockerError::CommandFailed {
                command: "docker network rm test_net".into(),
                stderr: "network test_net has 1 active endpoints".into(),
                exit_code: Some(1),
            })),
        };
        let shown = err.with_suggestion();
        assert!(shown.starts_with("Failed to tear down fixture 'network'"), "{shown}");
        assert!(shown.ends_with("Hint: Check that Docker is running: docker ps"), "{shown}");
        assert!(Error::Config("bad".into()).suggestion().is_none());
    }
}
