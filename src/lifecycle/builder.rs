use super::{FixtureContext, Fixtures, DEFAULT_READINESS_TIMEOUT};
use crate::config::Environment;
use crate::docker::{ContainerRuntime, DockerClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builder for a [`Fixtures`] manager.
///
/// # Example
///
/// ```no_run
/// use fixtures::{Environment, Fixtures};
/// use std::time::Duration;
///
/// let fixtures = Fixtures::builder()
///     .environment(Environment::from_env())
///     .readiness_timeout(Duration::from_secs(60))
///     .build();
/// ```
#[derive(Default)]
pub struct FixturesBuilder {
    environment: Option<Environment>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    parent_token: Option<CancellationToken>,
    readiness_timeout: Option<Duration>,
}

impl FixturesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// If not set, an empty [`Environment`] (debug off) is used.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Container runtime shared by all fixtures. Defaults to [`DockerClient`].
    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Cancelling `token` cancels in-flight setups of the built manager.
    pub fn parent_token(mut self, token: CancellationToken) -> Self {
        self.parent_token = Some(token);
        self
    }

    /// Readiness timeout for fixtures that do not set their own.
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Fixtures {
        let cancel = match self.parent_token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let ctx = FixtureContext::new(
            self.environment.unwrap_or_default(),
            self.runtime
                .unwrap_or_else(|| Arc::new(DockerClient::new()) as Arc<dyn ContainerRuntime>),
            cancel,
            self.readiness_timeout.unwrap_or(DEFAULT_READINESS_TIMEOUT),
        );
        Fixtures::with_context(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let fixtures = FixturesBuilder::new().build();
        assert!(!fixtures.context().debug());
        assert_eq!(fixtures.context().readiness_timeout(), DEFAULT_READINESS_TIMEOUT);
        assert!(fixtures.is_empty());
    }

    #[test]
    fn parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let fixtures = FixturesBuilder::new().parent_token(parent.clone()).build();
        assert!(!fixtures.is_cancelled());
        parent.cancel();
        assert!(fixtures.is_cancelled());
    }

    #[test]
    fn environment_is_threaded_to_context() {
        let fixtures = FixturesBuilder::new()
            .environment(Environment::default().with_debug(true))
            .readiness_timeout(Duration::from_secs(5))
            .build();
        assert!(fixtures.context().debug());
        assert_eq!(fixtures.context().readiness_timeout(), Duration::from_secs(5));
    }
}
