//! Fixture lifecycle: the [`Fixture`] contract and the [`Fixtures`] manager.
//!
//! ```text
//! Registered ─► SetupInProgress ─┬─► Ready ─► TeardownInProgress ─┬─► TornDown
//!                                └─► SetupFailed                  └─► TeardownFailed
//! ```
//!
//! Setup runs in registration order as fixtures are added. Teardown walks
//! the fixtures in reverse, keeps going past failures, and then waits for the
//! [`CleanupSet`] to drain before returning.

mod builder;
mod cleanup;
mod registry;

pub use builder::FixturesBuilder;
pub use cleanup::CleanupSet;
pub use registry::Fixtures;

use crate::config::Environment;
use crate::docker::ContainerRuntime;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Readiness timeout used by fixtures that do not set their own.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// A named unit of external-resource lifecycle.
///
/// Fixtures are shared behind `Arc` once registered, so both methods take
/// `&self` and keep mutable state behind interior locks.
#[async_trait]
pub trait Fixture: Send + Sync + 'static {
    /// Short tag logged next to the fixture name, e.g. `postgres`.
    fn kind(&self) -> &'static str;

    async fn set_up(&self, ctx: &FixtureContext) -> Result<()>;

    /// Release the fixture's resources. Must tolerate being called after a
    /// partial or failed `set_up`.
    async fn tear_down(&self, ctx: &FixtureContext) -> Result<()>;
}

/// Lifecycle state of one registered fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureState {
    Registered,
    SetupInProgress,
    Ready,
    SetupFailed,
    TeardownInProgress,
    TornDown,
    TeardownFailed,
}

impl FixtureState {
    /// Whether teardown should visit a fixture in this state.
    pub fn needs_teardown(&self) -> bool {
        matches!(
            self,
            FixtureState::SetupInProgress
                | FixtureState::Ready
                | FixtureState::SetupFailed
                | FixtureState::TeardownFailed
        )
    }

    /// Teardown of a fixture whose setup never completed is best effort.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, FixtureState::SetupInProgress | FixtureState::SetupFailed)
    }
}

impl fmt::Display for FixtureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixtureState::Registered => "registered",
            FixtureState::SetupInProgress => "setting up",
            FixtureState::Ready => "ready",
            FixtureState::SetupFailed => "setup failed",
            FixtureState::TeardownInProgress => "tearing down",
            FixtureState::TornDown => "torn down",
            FixtureState::TeardownFailed => "teardown failed",
        };
        write!(f, "{}", s)
    }
}

/// Everything a fixture may use during `set_up`/`tear_down`.
///
/// Owned by one [`Fixtures`] manager and cheap to clone.
#[derive(Clone)]
pub struct FixtureContext {
    environment: Arc<Environment>,
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancellationToken,
    cleanups: CleanupSet,
    readiness_timeout: Duration,
}

impl FixtureContext {
    pub(crate) fn new(
        environment: Environment,
        runtime: Arc<dyn ContainerRuntime>,
        cancel: CancellationToken,
        readiness_timeout: Duration,
    ) -> Self {
        FixtureContext {
            environment: Arc::new(environment),
            runtime,
            cancel,
            cleanups: CleanupSet::new(),
            readiness_timeout,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn debug(&self) -> bool {
        self.environment.debug
    }

    /// Container runtime shared by every fixture of the manager.
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cleanups(&self) -> &CleanupSet {
        &self.cleanups
    }

    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    /// Same context with a token that is never cancelled. Teardown must run
    /// to completion even after `cancel_operations()`.
    pub(crate) fn detached(&self) -> Self {
        FixtureContext {
            cancel: CancellationToken::new(),
            ..self.clone()
        }
    }

    /// Run `fut`, failing with [`Error::Cancelled`] if the context is
    /// cancelled first.
    pub async fn cancellable<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled(what.to_string())),
            result = fut => result,
        }
    }
}

impl fmt::Debug for FixtureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureContext")
            .field("environment", &self.environment)
            .field("runtime", &self.runtime)
            .field("is_cancelled", &self.is_cancelled())
            .field("pending_cleanups", &self.cleanups.len())
            .field("readiness_timeout", &self.readiness_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_visits_started_fixtures_only() {
        assert!(!FixtureState::Registered.needs_teardown());
        assert!(!FixtureState::TornDown.needs_teardown());
        assert!(!FixtureState::TeardownInProgress.needs_teardown());
        assert!(FixtureState::Ready.needs_teardown());
        assert!(FixtureState::SetupFailed.needs_teardown());
        assert!(FixtureState::TeardownFailed.needs_teardown());
    }

    #[test]
    fn only_incomplete_setups_are_best_effort() {
        assert!(FixtureState::SetupFailed.is_best_effort());
        assert!(!FixtureState::Ready.is_best_effort());
    }
}
