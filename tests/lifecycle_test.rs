// Lifecycle tests with in-memory fixtures
// No container runtime is touched: the fixtures only record what happens to them.
// Run with: cargo test --test lifecycle_test

use async_trait::async_trait;
use fixtures::{Error, Fixture, FixtureContext, FixtureState, Fixtures, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

type CallLog = Arc<Mutex<Vec<String>>>;

/// Fixture that appends `set_up:<name>` / `tear_down:<name>` to a shared log.
#[derive(Debug)]
struct Recording {
    name: String,
    log: CallLog,
    fail_set_up: bool,
    fail_tear_down: bool,
}

impl Recording {
    fn new(name: &str, log: &CallLog) -> Self {
        Recording {
            name: name.to_string(),
            log: log.clone(),
            fail_set_up: false,
            fail_tear_down: false,
        }
    }

    fn failing_set_up(mut self) -> Self {
        self.fail_set_up = true;
        self
    }

    fn failing_tear_down(mut self) -> Self {
        self.fail_tear_down = true;
        self
    }
}

#[async_trait]
impl Fixture for Recording {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn set_up(&self, _ctx: &FixtureContext) -> Result<()> {
        self.log.lock().push(format!("set_up:{}", self.name));
        if self.fail_set_up {
            return Err(Error::Config(format!("{} refused to start", self.name)));
        }
        Ok(())
    }

    async fn tear_down(&self, _ctx: &FixtureContext) -> Result<()> {
        self.log.lock().push(format!("tear_down:{}", self.name));
        if self.fail_tear_down {
            return Err(Error::Config(format!("{} refused to stop", self.name)));
        }
        Ok(())
    }
}

/// Fixture whose teardown hands container removal to the cleanup set.
struct SlowCleanup {
    done: Arc<AtomicBool>,
}

#[async_trait]
impl Fixture for SlowCleanup {
    fn kind(&self) -> &'static str {
        "slow-cleanup"
    }

    async fn set_up(&self, _ctx: &FixtureContext) -> Result<()> {
        Ok(())
    }

    async fn tear_down(&self, ctx: &FixtureContext) -> Result<()> {
        let done = self.done.clone();
        ctx.cleanups().spawn("remove container", async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            done.store(true, Ordering::SeqCst);
            Ok(())
        });
        Ok(())
    }
}

fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &CallLog) -> Vec<String> {
    log.lock().clone()
}

#[tokio::test]
async fn test_teardown_runs_in_reverse_registration_order() {
    let log = new_log();
    let fixtures = Fixtures::new();

    for name in ["a", "b", "c"] {
        fixtures
            .add_by_name(name, Recording::new(name, &log))
            .await
            .expect("setup should succeed");
    }

    fixtures.tear_down().await.expect("teardown should succeed");

    assert_eq!(
        entries(&log),
        vec![
            "set_up:a",
            "set_up:b",
            "set_up:c",
            "tear_down:c",
            "tear_down:b",
            "tear_down:a",
        ]
    );
    for name in ["a", "b", "c"] {
        assert_eq!(fixtures.state(name), Some(FixtureState::TornDown));
    }
}

#[tokio::test]
async fn test_teardown_continues_past_failures_and_returns_first() {
    let log = new_log();
    let fixtures = Fixtures::new();

    fixtures
        .add_by_name("a", Recording::new("a", &log).failing_tear_down())
        .await
        .unwrap();
    fixtures.add_by_name("b", Recording::new("b", &log)).await.unwrap();
    fixtures
        .add_by_name("c", Recording::new("c", &log).failing_tear_down())
        .await
        .unwrap();

    let err = fixtures.tear_down().await.expect_err("teardown should fail");

    // "c" is torn down first, so its failure is the one reported.
    match err {
        Error::TearDown { name, kind, .. } => {
            assert_eq!(name, "c");
            assert_eq!(kind, "recording");
        }
        other => panic!("unexpected error: {other}"),
    }

    let log = entries(&log);
    assert!(log.contains(&"tear_down:a".to_string()));
    assert!(log.contains(&"tear_down:b".to_string()));
    assert_eq!(fixtures.state("a"), Some(FixtureState::TeardownFailed));
    assert_eq!(fixtures.state("b"), Some(FixtureState::TornDown));
    assert_eq!(fixtures.state("c"), Some(FixtureState::TeardownFailed));
}

#[tokio::test]
async fn test_failed_teardown_is_retried_by_next_teardown() {
    let log = new_log();
    let fixtures = Fixtures::new();
    fixtures
        .add_by_name("flaky", Recording::new("flaky", &log).failing_tear_down())
        .await
        .unwrap();

    assert!(fixtures.tear_down().await.is_err());
    assert!(fixtures.tear_down().await.is_err());

    let teardowns = entries(&log)
        .iter()
        .filter(|e| e.as_str() == "tear_down:flaky")
        .count();
    assert_eq!(teardowns, 2);
}

#[tokio::test]
async fn test_setup_failure_names_the_fixture() {
    let log = new_log();
    let fixtures = Fixtures::new();

    fixtures.add_by_name("ok", Recording::new("ok", &log)).await.unwrap();
    let err = fixtures
        .add_by_name("broken", Recording::new("broken", &log).failing_set_up())
        .await
        .expect_err("setup should fail");

    let message = err.to_string();
    assert!(message.contains("'broken'"), "message was: {message}");
    assert!(message.contains("refused to start"), "message was: {message}");
    assert_eq!(fixtures.state("broken"), Some(FixtureState::SetupFailed));

    // Teardown still visits both; the failed one is best effort.
    fixtures.tear_down().await.expect("teardown should succeed");
    assert_eq!(
        entries(&log),
        vec![
            "set_up:ok",
            "set_up:broken",
            "tear_down:broken",
            "tear_down:ok",
        ]
    );
}

#[tokio::test]
async fn test_partial_setup_teardown_errors_are_not_surfaced() {
    let log = new_log();
    let fixtures = Fixtures::new();

    let _ = fixtures
        .add_by_name(
            "half",
            Recording::new("half", &log)
                .failing_set_up()
                .failing_tear_down(),
        )
        .await;

    fixtures
        .tear_down()
        .await
        .expect("teardown of a fixture that never started is best effort");
    assert_eq!(fixtures.state("half"), Some(FixtureState::TornDown));
}

#[tokio::test]
async fn test_teardown_waits_for_background_cleanups() {
    let done = Arc::new(AtomicBool::new(false));
    let fixtures = Fixtures::new();
    fixtures
        .add(SlowCleanup { done: done.clone() })
        .await
        .unwrap();

    fixtures.tear_down().await.unwrap();

    assert!(done.load(Ordering::SeqCst), "cleanup must finish before tear_down returns");
    assert!(fixtures.context().cleanups().is_empty());
}

#[tokio::test]
async fn test_recover_tear_down_passes_through_normal_results() {
    let log = new_log();
    let fixtures = Fixtures::new();

    let value = fixtures
        .recover_tear_down(async {
            fixtures.add_by_name("a", Recording::new("a", &log)).await?;
            Result::Ok(42)
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    // Normal completion leaves fixtures for the caller to tear down.
    assert_eq!(fixtures.state("a"), Some(FixtureState::Ready));
    fixtures.tear_down().await.unwrap();
}

#[tokio::test]
async fn test_recover_tear_down_tears_down_once_and_resumes_panic() {
    let log = new_log();
    let fixtures = Arc::new(Fixtures::new());

    let handle = {
        let fixtures = fixtures.clone();
        let log = log.clone();
        tokio::spawn(async move {
            fixtures
                .recover_tear_down(async {
                    fixtures
                        .add_by_name("a", Recording::new("a", &log))
                        .await
                        .unwrap();
                    fixtures
                        .add_by_name("b", Recording::new("b", &log))
                        .await
                        .unwrap();
                    panic!("boom");
                })
                .await
        })
    };

    let join_err = handle.await.expect_err("the panic must be resumed");
    assert!(join_err.is_panic());
    let payload = join_err.into_panic();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    assert_eq!(
        entries(&log),
        vec!["set_up:a", "set_up:b", "tear_down:b", "tear_down:a"]
    );

    // A later explicit teardown finds nothing left to do.
    fixtures.tear_down().await.unwrap();
    assert_eq!(entries(&log).len(), 4);
}

#[tokio::test]
async fn test_recover_tear_down_resumes_panic_even_if_teardown_fails() {
    let log = new_log();
    let fixtures = Arc::new(Fixtures::new());

    let handle = {
        let fixtures = fixtures.clone();
        let log = log.clone();
        tokio::spawn(async move {
            fixtures
                .recover_tear_down(async {
                    fixtures
                        .add_by_name("a", Recording::new("a", &log).failing_tear_down())
                        .await
                        .unwrap();
                    panic!("original failure");
                })
                .await
        })
    };

    let payload = handle.await.unwrap_err().into_panic();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"original failure"));
    assert_eq!(fixtures.state("a"), Some(FixtureState::TeardownFailed));
}

#[tokio::test]
async fn test_cancelled_setup_is_reported_and_torn_down() {
    let log = new_log();
    let token = tokio_util::sync::CancellationToken::new();
    let fixtures = Fixtures::builder().parent_token(token.clone()).build();

    fixtures.add_by_name("a", Recording::new("a", &log)).await.unwrap();
    token.cancel();
    assert!(fixtures.is_cancelled());

    let err = fixtures
        .add_by_name("b", Recording::new("b", &log))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SetUp { .. }));

    // Teardown ignores cancellation.
    fixtures.tear_down().await.unwrap();
    assert!(entries(&log).contains(&"tear_down:a".to_string()));
}
