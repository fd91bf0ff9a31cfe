use super::{Fixture, FixtureContext, FixtureState, FixturesBuilder};
use crate::config::Environment;
use crate::error::{Error, Result};
use crate::logging::status_symbol;
use crate::names;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;

struct Entry {
    fixture: Arc<dyn Fixture>,
    /// Same allocation as `fixture`, kept for typed lookups.
    any: Arc<dyn Any + Send + Sync>,
    state: FixtureState,
}

#[derive(Default)]
struct Registry {
    order: Vec<String>,
    store: HashMap<String, Entry>,
}

/// Ordered collection of named fixtures.
///
/// Fixtures are set up as they are added and torn down in reverse order by
/// [`Fixtures::tear_down`].
///
/// # Example
///
/// ```no_run
/// use fixtures::{DockerNetwork, Fixtures, Postgres};
///
/// # async fn example() -> fixtures::Result<()> {
/// let fixtures = Fixtures::from_env();
/// fixtures
///     .recover_tear_down(async {
///         let network = fixtures.add(DockerNetwork::new()).await?;
///         let db = fixtures.add(Postgres::new(network)).await?;
///         let _client = db.connect(Default::default()).await?;
///         fixtures::Result::Ok(())
///     })
///     .await?;
/// fixtures.tear_down().await
/// # }
/// ```
pub struct Fixtures {
    ctx: FixtureContext,
    registry: Mutex<Registry>,
}

impl Fixtures {
    pub fn builder() -> FixturesBuilder {
        FixturesBuilder::new()
    }

    /// Manager with default settings and the Docker CLI runtime.
    pub fn new() -> Self {
        FixturesBuilder::new().build()
    }

    /// Manager configured from `DEBUG` and `HOST_NETWORK_NAME`.
    pub fn from_env() -> Self {
        FixturesBuilder::new()
            .environment(Environment::from_env())
            .build()
    }

    pub(crate) fn with_context(ctx: FixtureContext) -> Self {
        Fixtures {
            ctx,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn context(&self) -> &FixtureContext {
        &self.ctx
    }

    pub fn environment(&self) -> &Environment {
        self.ctx.environment()
    }

    /// Register `fixture` under a generated name and set it up.
    pub async fn add<F: Fixture>(&self, fixture: F) -> Result<Arc<F>> {
        let name = loop {
            let candidate = names::random_name();
            if !self.registry.lock().store.contains_key(&candidate) {
                break candidate;
            }
        };
        self.add_by_name(name, fixture).await
    }

    /// Register `fixture` as `name` and set it up.
    ///
    /// A setup failure is returned wrapped in [`Error::SetUp`]; fixtures
    /// registered earlier are left in place for [`Fixtures::tear_down`].
    pub async fn add_by_name<F: Fixture>(&self, name: impl Into<String>, fixture: F) -> Result<Arc<F>> {
        let name = name.into();
        let fixture = Arc::new(fixture);
        let kind = fixture.kind();

        {
            let mut registry = self.registry.lock();
            if registry.store.contains_key(&name) {
                return Err(Error::Config(format!(
                    "fixture '{}' is already registered",
                    name
                )));
            }
            registry.order.push(name.clone());
            registry.store.insert(
                name.clone(),
                Entry {
                    fixture: fixture.clone() as Arc<dyn Fixture>,
                    any: fixture.clone() as Arc<dyn Any + Send + Sync>,
                    state: FixtureState::Registered,
                },
            );
        }

        self.set_state(&name, FixtureState::SetupInProgress);
        let started = Instant::now();
        let result = self
            .ctx
            .cancellable(&format!("setting up '{}'", name), fixture.set_up(&self.ctx))
            .await;

        let ok = result.is_ok();
        self.set_state(
            &name,
            if ok {
                FixtureState::Ready
            } else {
                FixtureState::SetupFailed
            },
        );
        tracing::debug!(
            name = %name,
            kind = kind,
            status = status_symbol(ok),
            elapsed = ?started.elapsed(),
            "setup"
        );

        match result {
            Ok(()) => Ok(fixture),
            Err(e) => {
                tracing::warn!(
                    "Failed to set up fixture '{}' ({}): {}",
                    name,
                    kind,
                    e.with_suggestion()
                );
                Err(Error::SetUp {
                    name,
                    kind: kind.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Fixture registered as `name`.
    ///
    /// # Panics
    ///
    /// If no fixture is registered under `name`. Fixtures are only looked up
    /// by the code that registered them, so a miss is a bug in the test.
    pub fn get(&self, name: &str) -> Arc<dyn Fixture> {
        match self.try_get(name) {
            Some(fixture) => fixture,
            None => panic!("fixture '{}' is not registered", name),
        }
    }

    pub fn try_get(&self, name: &str) -> Option<Arc<dyn Fixture>> {
        self.registry
            .lock()
            .store
            .get(name)
            .map(|e| e.fixture.clone())
    }

    /// Typed lookup.
    ///
    /// # Panics
    ///
    /// If `name` is not registered or was registered with another type.
    pub fn get_as<F: Fixture>(&self, name: &str) -> Arc<F> {
        match self.try_get_as::<F>(name) {
            Some(fixture) => fixture,
            None => panic!(
                "fixture '{}' is not registered as {}",
                name,
                std::any::type_name::<F>()
            ),
        }
    }

    pub fn try_get_as<F: Fixture>(&self, name: &str) -> Option<Arc<F>> {
        let any = self.registry.lock().store.get(name)?.any.clone();
        any.downcast::<F>().ok()
    }

    pub fn state(&self, name: &str) -> Option<FixtureState> {
        self.registry.lock().store.get(name).map(|e| e.state)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.registry.lock().order.clone()
    }

    pub fn len(&self) -> usize {
        self.registry.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().order.is_empty()
    }

    /// Tear down every started fixture, last registered first.
    ///
    /// Keeps going past failures: every failure is logged and the first one
    /// is returned. Does not return until all background cleanups spawned
    /// through the context have finished. Fixtures already torn down are
    /// skipped, so calling this twice is safe. Cancellation is ignored.
    pub async fn tear_down(&self) -> Result<()> {
        let pending: Vec<(String, Arc<dyn Fixture>, FixtureState)> = {
            let registry = self.registry.lock();
            registry
                .order
                .iter()
                .rev()
                .filter_map(|name| {
                    let entry = registry.store.get(name)?;
                    entry
                        .state
                        .needs_teardown()
                        .then(|| (name.clone(), entry.fixture.clone(), entry.state))
                })
                .collect()
        };

        let ctx = self.ctx.detached();
        let mut first_error: Option<Error> = None;

        for (name, fixture, previous) in pending {
            let kind = fixture.kind();
            self.set_state(&name, FixtureState::TeardownInProgress);
            let started = Instant::now();
            let result = fixture.tear_down(&ctx).await;
            let ok = result.is_ok();

            tracing::debug!(
                name = %name,
                kind = kind,
                status = status_symbol(ok),
                elapsed = ?started.elapsed(),
                "teardown"
            );

            match result {
                Ok(()) => self.set_state(&name, FixtureState::TornDown),
                Err(e) if previous.is_best_effort() => {
                    // Setup never completed; whatever it left behind may
                    // legitimately be missing.
                    tracing::debug!(
                        "Ignoring teardown error for partially set up fixture '{}': {}",
                        name,
                        e
                    );
                    self.set_state(&name, FixtureState::TornDown);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to tear down fixture '{}' ({}): {}",
                        name,
                        kind,
                        e.with_suggestion()
                    );
                    self.set_state(&name, FixtureState::TeardownFailed);
                    if first_error.is_none() {
                        first_error = Some(Error::TearDown {
                            name,
                            kind: kind.to_string(),
                            source: Box::new(e),
                        });
                    }
                }
            }
        }

        ctx.cleanups().wait().await;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run `body`; if it panics, tear down and resume the panic.
    ///
    /// Teardown errors during recovery are logged, never surfaced, so the
    /// original panic reaches the test harness unchanged. A body that
    /// completes normally leaves the fixtures in place.
    pub async fn recover_tear_down<T, F>(&self, body: F) -> T
    where
        F: Future<Output = T>,
    {
        match AssertUnwindSafe(body).catch_unwind().await {
            Ok(value) => value,
            Err(payload) => {
                tracing::debug!("Panic in fixture scope, tearing down before resuming");
                if let Err(e) = self.tear_down().await {
                    tracing::error!("Teardown after panic failed: {}", e.with_suggestion());
                }
                std::panic::resume_unwind(payload)
            }
        }
    }

    /// Cancel in-flight setups and readiness waits.
    ///
    /// Teardown is unaffected.
    pub fn cancel_operations(&self) {
        self.ctx.cancellation_token().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }

    fn set_state(&self, name: &str, state: FixtureState) {
        if let Some(entry) = self.registry.lock().store.get_mut(name) {
            entry.state = state;
        }
    }
}

impl Default for Fixtures {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Fixtures {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        let live: Vec<&str> = registry
            .order
            .iter()
            .filter(|n| {
                registry
                    .store
                    .get(n.as_str())
                    .is_some_and(|e| e.state == FixtureState::Ready)
            })
            .map(String::as_str)
            .collect();
        if !live.is_empty() {
            tracing::warn!(
                "Fixtures dropped without tear_down(); still set up: {}",
                live.join(", ")
            );
        }
    }
}

impl std::fmt::Debug for Fixtures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        let states: Vec<(String, FixtureState)> = registry
            .order
            .iter()
            .filter_map(|n| registry.store.get(n).map(|e| (n.clone(), e.state)))
            .collect();
        f.debug_struct("Fixtures")
            .field("ctx", &self.ctx)
            .field("fixtures", &states)
            .finish()
    }
}
