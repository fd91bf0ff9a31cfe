//! Readiness polling for asynchronously starting processes.
//!
//! Each attempt resolves the reachable port, runs a cheap health probe, then
//! opens and closes a real connection. Any step failing sends the attempt back
//! to the retry executor until the timeout, after which the caller sees
//! `Gave up waiting for <kind>` wrapping the last failure.

mod probe;

pub use probe::ProbeStatus;

use crate::error::{Error, Result};
use crate::retry::{Backoff, Retry};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Something that can be polled until it accepts connections.
#[async_trait]
pub trait ReadinessTarget: Send + Sync {
    /// Short name used in errors, e.g. `postgres`.
    fn kind(&self) -> &str;

    /// Port the test process should dial. Fails with
    /// [`Error::PortNotMapped`] while the runtime has not published it.
    async fn resolve_port(&self) -> Result<String>;

    /// Lightweight health check against `port`.
    async fn probe(&self, port: &str) -> Result<ProbeStatus>;

    /// Open and close a real protocol connection.
    async fn confirm(&self, port: &str) -> Result<()>;
}

/// Readiness polling policy.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    timeout: Duration,
    backoff: Backoff,
    cancel: Option<CancellationToken>,
}

impl ReadinessPoller {
    pub fn new(timeout: Duration) -> Self {
        ReadinessPoller {
            timeout,
            backoff: Backoff::default(),
            cancel: None,
        }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub async fn wait(&self, target: &dyn ReadinessTarget) -> Result<()> {
        let mut policy = Retry::new(self.timeout).backoff(self.backoff);
        if let Some(ref token) = self.cancel {
            policy = policy.cancel_on(token.clone());
        }

        let kind = target.kind();
        let started = tokio::time::Instant::now();
        policy
            .run(kind, || async move {
                let port = target.resolve_port().await?;
                target.probe(&port).await?.into_result(kind)?;
                target.confirm(&port).await
            })
            .await?;

        tracing::debug!(kind = %kind, elapsed = ?started.elapsed(), "ready");
        Ok(())
    }
}

/// Poll `target` with the default backoff until ready or `timeout` passes.
pub async fn wait_until_ready(target: &dyn ReadinessTarget, timeout: Duration) -> Result<()> {
    ReadinessPoller::new(timeout).wait(target).await
}

/// Port lookup failure for `container`.
pub fn port_not_mapped(container: &str, port: &str) -> Error {
    Error::PortNotMapped {
        container: container.to_string(),
        port: port.to_string(),
    }
}
