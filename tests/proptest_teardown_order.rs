// Property-based tests for fixture teardown ordering
//
// Whatever mix of fixtures succeeds or fails, teardown must visit every
// started fixture exactly once, in reverse registration order, and report the
// first real teardown failure.

use async_trait::async_trait;
use fixtures::{Error, Fixture, FixtureContext, FixtureState, Fixtures, Result};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Behaviour {
    fail_set_up: bool,
    fail_tear_down: bool,
}

fn behaviour_strategy() -> impl Strategy<Value = Behaviour> {
    (prop::bool::weighted(0.2), prop::bool::weighted(0.3)).prop_map(|(fail_set_up, fail_tear_down)| {
        Behaviour {
            fail_set_up,
            fail_tear_down,
        }
    })
}

struct Probe {
    index: usize,
    behaviour: Behaviour,
    torn_down: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Fixture for Probe {
    fn kind(&self) -> &'static str {
        "probe"
    }

    async fn set_up(&self, _ctx: &FixtureContext) -> Result<()> {
        if self.behaviour.fail_set_up {
            return Err(Error::Config(format!("fixture {} failed", self.index)));
        }
        Ok(())
    }

    async fn tear_down(&self, _ctx: &FixtureContext) -> Result<()> {
        self.torn_down.lock().push(self.index);
        if self.behaviour.fail_tear_down {
            return Err(Error::Config(format!("fixture {} stuck", self.index)));
        }
        Ok(())
    }
}

proptest! {
    /// Property test: teardown order is the exact reverse of registration.
    #[test]
    fn test_teardown_reverses_registration(behaviours in prop::collection::vec(behaviour_strategy(), 1..20)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (order, result, states) = runtime.block_on(async {
            let torn_down = Arc::new(Mutex::new(Vec::new()));
            let fixtures = Fixtures::new();

            for (index, behaviour) in behaviours.iter().enumerate() {
                let _ = fixtures
                    .add_by_name(
                        format!("f{}", index),
                        Probe { index, behaviour: *behaviour, torn_down: torn_down.clone() },
                    )
                    .await;
            }

            let result = fixtures.tear_down().await;
            let states: Vec<Option<FixtureState>> = (0..behaviours.len())
                .map(|i| fixtures.state(&format!("f{}", i)))
                .collect();
            let order = torn_down.lock().clone();
            (order, result, states)
        });

        let expected: Vec<usize> = (0..behaviours.len()).rev().collect();
        prop_assert_eq!(order, expected);

        // Only fixtures that were fully set up can fail teardown for real.
        let first_real_failure = behaviours
            .iter()
            .enumerate()
            .rev()
            .find(|(_, b)| !b.fail_set_up && b.fail_tear_down)
            .map(|(i, _)| format!("f{}", i));

        match (result, first_real_failure) {
            (Ok(()), None) => {}
            (Err(Error::TearDown { name, .. }), Some(expected)) => {
                prop_assert_eq!(name, expected);
            }
            (other, expected) => {
                prop_assert!(false, "got {:?}, expected failure of {:?}", other.err(), expected);
            }
        }

        for (i, b) in behaviours.iter().enumerate() {
            let expected_state = if !b.fail_set_up && b.fail_tear_down {
                FixtureState::TeardownFailed
            } else {
                FixtureState::TornDown
            };
            prop_assert_eq!(states[i], Some(expected_state));
        }
    }

    /// Property test: a second teardown only revisits fixtures that failed.
    #[test]
    fn test_second_teardown_revisits_failures_only(behaviours in prop::collection::vec(behaviour_strategy(), 1..12)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let second_pass = runtime.block_on(async {
            let torn_down = Arc::new(Mutex::new(Vec::new()));
            let fixtures = Fixtures::new();

            for (index, behaviour) in behaviours.iter().enumerate() {
                let _ = fixtures
                    .add_by_name(
                        format!("f{}", index),
                        Probe { index, behaviour: *behaviour, torn_down: torn_down.clone() },
                    )
                    .await;
            }

            let _ = fixtures.tear_down().await;
            torn_down.lock().clear();
            let _ = fixtures.tear_down().await;
            let second = torn_down.lock().clone();
            second
        });

        let expected: Vec<usize> = (0..behaviours.len())
            .rev()
            .filter(|&i| !behaviours[i].fail_set_up && behaviours[i].fail_tear_down)
            .collect();
        prop_assert_eq!(second_pass, expected);
    }
}
