// Retry executor tests
// Time is paused, so backoff sleeps complete instantly and deterministically.
// Run with: cargo test --test retry_test

use fixtures::{retry, Backoff, Error, Retry};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn rejecting() -> Error {
    Error::NotReady {
        target: "postgres".into(),
        code: 1,
        reason: "server is rejecting connections".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_transient_failures() {
    for failures in [0u32, 1, 3, 5] {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = retry(Duration::from_secs(30), "postgres", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(rejecting())
                } else {
                    Ok("connected")
                }
            }
        })
        .await
        .expect("should eventually succeed");

        assert_eq!(value, "connected");
        assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_before_deadline_with_last_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let started = Instant::now();
    let deadline = Duration::from_secs(5);

    let err = retry(deadline, "postgres", || {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::NotReady {
                target: "postgres".into(),
                code: 2,
                reason: format!("no response (attempt {})", n + 1),
            })
        }
    })
    .await
    .expect_err("should give up");

    // The final attempt lands on the deadline, within timer resolution.
    let elapsed = started.elapsed();
    assert!(elapsed >= deadline, "gave up early after {elapsed:?}");
    assert!(elapsed < deadline + Duration::from_millis(10), "overran: {elapsed:?}");

    let attempts_made = calls.load(Ordering::SeqCst);
    match err {
        Error::GaveUp {
            target,
            attempts,
            source,
        } => {
            assert_eq!(target, "postgres");
            assert_eq!(attempts, attempts_made);
            // Backoff caps at one second, so five seconds allows several tries.
            assert!(attempts >= 4, "only {attempts} attempts");
            let last = format!("no response (attempt {})", attempts);
            assert!(source.to_string().contains(&last), "source was: {source}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_gave_up_message_names_target() {
    let err = Retry::new(Duration::from_millis(100))
        .backoff(Backoff::constant(Duration::from_millis(40)))
        .run("postgres", || async { Err::<(), _>(rejecting()) })
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("Gave up waiting for postgres"), "{message}");
    assert!(message.contains("server is rejecting connections"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn test_constant_backoff_attempt_count() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    // Attempts at 0, 100, 200, 300 and 400ms, then a shortened 50ms sleep
    // and a final attempt on the 450ms deadline.
    let _ = Retry::new(Duration::from_millis(450))
        .backoff(Backoff::constant(Duration::from_millis(100)))
        .run("redis", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(rejecting())
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn test_structural_errors_fail_fast() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let err = retry(Duration::from_secs(30), "postgres", || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::Environment("hostname cannot be resolved".into()))
        }
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, Error::Environment(_)));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_retrying() {
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        canceller.cancel();
    });

    let err = Retry::new(Duration::from_secs(60))
        .backoff(Backoff::constant(Duration::from_millis(500)))
        .cancel_on(token)
        .run("postgres", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(rejecting())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(_)));
    // Attempts at 0, 500 and 1000ms; cancelled during the third sleep.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
