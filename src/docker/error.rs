use std::fmt;
use std::time::Duration;

/// Structured error type for container runtime operations.
#[derive(Debug)]
pub enum DockerError {
    /// A docker command did not finish within its timeout.
    Timeout { command: String, timeout: Duration },

    /// A docker command ran but returned non-zero exit.
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// The docker binary couldn't be executed (not in PATH, permission denied).
    ExecFailed {
        command: String,
        source: std::io::Error,
    },

    /// A container or network does not exist.
    NotFound { kind: &'static str, name: String },

    /// `docker inspect` output could not be understood.
    MalformedOutput { command: String, detail: String },

    /// Docker daemon not responding.
    DaemonUnavailable,
}

impl DockerError {
    pub fn timeout(cmd: impl Into<String>, dur: Duration) -> Self {
        DockerError::Timeout {
            command: cmd.into(),
            timeout: dur,
        }
    }

    /// Create a command-failed error from an `std::process::Output`.
    pub fn failed(cmd: impl Into<String>, output: &std::process::Output) -> Self {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        DockerError::CommandFailed {
            command: cmd.into(),
            stderr,
            exit_code: output.status.code(),
        }
    }

    pub fn exec_failed(cmd: impl Into<String>, err: std::io::Error) -> Self {
        DockerError::ExecFailed {
            command: cmd.into(),
            source: err,
        }
    }

    pub fn malformed(cmd: impl Into<String>, detail: impl fmt::Display) -> Self {
        DockerError::MalformedOutput {
            command: cmd.into(),
            detail: detail.to_string(),
        }
    }

    /// True when the daemon reported that the object is gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            DockerError::NotFound { .. } => true,
            DockerError::CommandFailed { stderr, .. } => {
                stderr.contains("No such container")
                    || stderr.contains("No such network")
                    || stderr.contains("not found")
            }
            _ => false,
        }
    }
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerError::Timeout { command, timeout } => {
                write!(
                    f,
                    "Timed out running '{}' (exceeded {} seconds)",
                    command,
                    timeout.as_secs()
                )
            }
            DockerError::CommandFailed {
                command,
                stderr,
                exit_code,
            } => {
                if let Some(code) = exit_code {
                    write!(f, "'{}' failed (exit code {}): {}", command, code, stderr)
                } else {
                    write!(f, "'{}' failed: {}", command, stderr)
                }
            }
            DockerError::ExecFailed { command, source } => {
                write!(f, "Failed to execute '{}': {}", command, source)
            }
            DockerError::NotFound { kind, name } => {
                write!(f, "No such {}: {}", kind, name)
            }
            DockerError::MalformedOutput { command, detail } => {
                write!(f, "Unexpected output from '{}': {}", command, detail)
            }
            DockerError::DaemonUnavailable => {
                write!(f, "Docker daemon is not responding")
            }
        }
    }
}

impl std::error::Error for DockerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DockerError::ExecFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
