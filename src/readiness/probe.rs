use crate::error::{Error, Result};

/// Outcome of a client-side "is it accepting connections" probe, decoded
/// from the probe's exit code (`pg_isready` conventions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Ready,
    Rejecting,
    NoResponse,
    NoAttempt,
    Unknown(i64),
}

impl ProbeStatus {
    pub fn from_exit_code(code: i64) -> Self {
        match code {
            0 => ProbeStatus::Ready,
            1 => ProbeStatus::Rejecting,
            2 => ProbeStatus::NoResponse,
            3 => ProbeStatus::NoAttempt,
            other => ProbeStatus::Unknown(other),
        }
    }

    pub fn exit_code(&self) -> i64 {
        match self {
            ProbeStatus::Ready => 0,
            ProbeStatus::Rejecting => 1,
            ProbeStatus::NoResponse => 2,
            ProbeStatus::NoAttempt => 3,
            ProbeStatus::Unknown(code) => *code,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ProbeStatus::Ready => "accepting connections",
            ProbeStatus::Rejecting => "server is rejecting connections",
            ProbeStatus::NoResponse => "no response",
            ProbeStatus::NoAttempt => "no attempt was made",
            ProbeStatus::Unknown(_) => "unknown",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeStatus::Ready)
    }

    /// `Ok` when ready, otherwise a retryable [`Error::NotReady`].
    pub fn into_result(self, target: &str) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        Err(Error::NotReady {
            target: target.to_string(),
            code: self.exit_code(),
            reason: self.reason().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_exit_codes() {
        assert_eq!(ProbeStatus::from_exit_code(0), ProbeStatus::Ready);
        assert_eq!(ProbeStatus::from_exit_code(1).reason(), "server is rejecting connections");
        assert_eq!(ProbeStatus::from_exit_code(2).reason(), "no response");
        assert_eq!(ProbeStatus::from_exit_code(3).reason(), "no attempt was made");
    }

    #[test]
    fn other_codes_are_unknown() {
        for code in [-1, 4, 127] {
            let status = ProbeStatus::from_exit_code(code);
            assert_eq!(status, ProbeStatus::Unknown(code));
            assert_eq!(status.reason(), "unknown");
            assert_eq!(status.exit_code(), code);
        }
    }

    #[test]
    fn not_ready_error_message() {
        let err = ProbeStatus::Rejecting.into_result("postgres").unwrap_err();
        assert_eq!(
            err.to_string(),
            "postgres is not ready: (1) server is rejecting connections"
        );
        assert!(err.is_retryable());
        assert!(ProbeStatus::Ready.into_result("postgres").is_ok());
    }
}
