// ABOUTME: Tests for the throttle coordinator in trailing and leading modes.
// ABOUTME: Covers spacing, coalescing, failure handling, cancellation, and disposal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, ready};
use tokio::time::{Instant, sleep};

use super::throttler::{ThrottleStatus, Throttler};
use crate::config::{AnchorMode, ThrottleConfig, ThrottleMode};
use crate::error::CoordinatorError;

type Log = Arc<Mutex<Vec<(&'static str, Duration)>>>;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<&'static str>> + Send>;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Work that logs its tag and start time, runs for `takes`, and returns the tag.
fn record(log: &Log, start: Instant, tag: &'static str, takes: Duration) -> Job {
    let log = Arc::clone(log);
    Box::new(move || {
        async move {
            log.lock().unwrap().push((tag, start.elapsed()));
            if !takes.is_zero() {
                sleep(takes).await;
            }
            anyhow::Ok(tag)
        }
        .boxed()
    })
}

/// Work that logs its tag and then fails.
fn fail(log: &Log, start: Instant, tag: &'static str) -> Job {
    let log = Arc::clone(log);
    Box::new(move || {
        log.lock().unwrap().push((tag, start.elapsed()));
        ready(Err(anyhow::anyhow!("{} failed", tag))).boxed()
    })
}

fn tags(log: &Log) -> Vec<&'static str> {
    log.lock().unwrap().iter().map(|(tag, _)| *tag).collect()
}

fn started_at(log: &Log, tag: &str) -> Duration {
    log.lock()
        .unwrap()
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, at)| *at)
        .unwrap_or_else(|| panic!("{} never ran", tag))
}

fn trailing(interval: u64) -> Throttler<&'static str> {
    Throttler::new(ms(interval))
}

#[tokio::test]
async fn test_idle_call_runs_immediately() {
    let throttler: Throttler<u32> = Throttler::new(ms(10));
    let result = throttler.throttle(|| ready(Ok(42))).unwrap().wait().await;
    assert_eq!(result.unwrap(), 42);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_keeps_latest_call_for_next_slot() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    let a = throttler.throttle(record(&log, start, "a", Duration::ZERO)).unwrap();
    sleep(ms(30)).await;
    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();
    sleep(ms(30)).await;
    let c = throttler.throttle(record(&log, start, "c", Duration::ZERO)).unwrap();

    assert_eq!(a.wait().await.unwrap(), "a");
    assert_eq!(b.wait().await.unwrap(), "c");
    assert_eq!(c.wait().await.unwrap(), "c");
    assert_eq!(tags(&log), vec!["a", "c"]);

    let promoted = started_at(&log, "c");
    assert!(promoted >= ms(100) && promoted < ms(110), "promoted at {:?}", promoted);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_from_completion_spaces_after_finish() {
    let config = ThrottleConfig::new(ms(100)).with_anchor(AnchorMode::FromCompletion);
    let throttler = Throttler::with_config(config);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(record(&log, start, "a", ms(50))).unwrap();
    sleep(ms(10)).await;
    let next = throttler.throttle(record(&log, start, "b", ms(50))).unwrap();

    assert_eq!(next.wait().await.unwrap(), "b");
    let promoted = started_at(&log, "b");
    assert!(promoted >= ms(150) && promoted < ms(160), "promoted at {:?}", promoted);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_from_start_promotes_at_once_after_long_work() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(record(&log, start, "a", ms(150))).unwrap();
    sleep(ms(10)).await;
    let next = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();

    assert_eq!(next.wait().await.unwrap(), "b");
    let promoted = started_at(&log, "b");
    assert!(promoted >= ms(150) && promoted < ms(160), "promoted at {:?}", promoted);
}

#[tokio::test(start_paused = true)]
async fn test_call_after_cooldown_runs_immediately() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(record(&log, start, "a", Duration::ZERO)).unwrap();
    sleep(ms(150)).await;
    assert_eq!(throttler.status(), ThrottleStatus::Idle);

    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();
    assert_eq!(b.wait().await.unwrap(), "b");
    assert_eq!(started_at(&log, "b"), ms(150));
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_cooldown_by_default() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    let a = throttler.throttle(fail(&log, start, "a")).unwrap();
    sleep(ms(10)).await;
    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();

    assert!(a.wait().await.unwrap_err().is_work_failure());
    assert_eq!(b.wait().await.unwrap(), "b");
    assert!(started_at(&log, "b") >= ms(100));
}

#[tokio::test(start_paused = true)]
async fn test_reset_on_failure_skips_cooldown() {
    let config = ThrottleConfig::new(ms(100)).with_reset_on_failure(true);
    let throttler = Throttler::with_config(config);
    let log = new_log();
    let start = Instant::now();

    let a = throttler.throttle(fail(&log, start, "a")).unwrap();
    sleep(ms(10)).await;
    assert_eq!(throttler.status(), ThrottleStatus::Idle);

    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();
    assert!(a.wait().await.is_err());
    assert_eq!(b.wait().await.unwrap(), "b");
    assert_eq!(started_at(&log, "b"), ms(10));
}

#[tokio::test(start_paused = true)]
async fn test_window_shares_failure() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(record(&log, start, "a", Duration::ZERO)).unwrap();
    sleep(ms(10)).await;
    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();
    let c = throttler.throttle(fail(&log, start, "c")).unwrap();

    for cell in [b, c] {
        let err = cell.wait().await.unwrap_err();
        assert!(err.to_string().contains("c failed"));
    }
    assert_eq!(tags(&log), vec!["a", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_status_transitions() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();
    assert_eq!(throttler.status(), ThrottleStatus::Idle);

    throttler.throttle(record(&log, start, "a", ms(50))).unwrap();
    assert_eq!(throttler.status(), ThrottleStatus::Executing);

    sleep(ms(60)).await;
    assert_eq!(throttler.status(), ThrottleStatus::Cooldown);
    assert_eq!(throttler.status().to_string(), "cooldown");

    sleep(ms(100)).await;
    assert_eq!(throttler.status(), ThrottleStatus::Idle);
}

#[tokio::test]
async fn test_throttle_after_dispose_fails() {
    let throttler: Throttler<u32> = Throttler::new(ms(10));
    throttler.dispose();
    throttler.dispose();

    assert!(throttler.is_disposed());
    assert!(matches!(
        throttler.throttle(|| ready(Ok(1))),
        Err(CoordinatorError::Disposed)
    ));
    assert!(matches!(
        throttler.throttle_detached(|| ready(Ok(1))),
        Err(CoordinatorError::Disposed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_flush_runs_deferred_call_without_waiting_for_cooldown() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(record(&log, start, "a", Duration::ZERO)).unwrap();
    sleep(ms(10)).await;
    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();

    let flushed = throttler.flush_and_dispose().await.unwrap();
    assert_eq!(flushed, Some("b"));
    assert_eq!(started_at(&log, "b"), ms(10));
    assert_eq!(b.wait().await.unwrap(), "b");
    assert!(throttler.is_disposed());
}

#[tokio::test(start_paused = true)]
async fn test_flush_waits_for_in_flight_execution() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    let a = throttler.throttle(record(&log, start, "a", ms(50))).unwrap();
    sleep(ms(10)).await;
    throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();

    assert_eq!(throttler.flush_and_dispose().await.unwrap(), Some("b"));
    assert_eq!(a.wait().await.unwrap(), "a");
    assert!(started_at(&log, "b") >= ms(50));
}

#[tokio::test]
async fn test_flush_with_nothing_deferred_returns_none() {
    let throttler: Throttler<u32> = Throttler::new(ms(100));
    assert!(throttler.flush_and_dispose().await.unwrap().is_none());
    assert!(throttler.is_disposed());
}

#[tokio::test(start_paused = true)]
async fn test_dispose_abandons_deferred_call() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(record(&log, start, "a", Duration::ZERO)).unwrap();
    sleep(ms(10)).await;
    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();
    throttler.dispose();

    assert!(matches!(
        b.wait_timeout(ms(500)).await,
        Err(CoordinatorError::Timeout)
    ));
    assert_eq!(tags(&log), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_does_not_stop_execution() {
    let throttler = trailing(100);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(record(&log, start, "a", Duration::ZERO)).unwrap();
    let cancelled = throttler
        .throttle_with_cancel(record(&log, start, "b", Duration::ZERO), sleep(ms(5)))
        .await;
    assert!(matches!(cancelled, Err(CoordinatorError::Cancelled)));

    sleep(ms(200)).await;
    assert_eq!(tags(&log), vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_leading_joins_current_window() {
    let config = ThrottleConfig::new(ms(100)).with_mode(ThrottleMode::Leading);
    let throttler = Throttler::with_config(config);
    let log = new_log();
    let start = Instant::now();

    let a = throttler.throttle(record(&log, start, "a", Duration::ZERO)).unwrap();
    sleep(ms(50)).await;
    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();
    sleep(ms(70)).await;
    let c = throttler.throttle(record(&log, start, "c", Duration::ZERO)).unwrap();

    assert_eq!(a.wait().await.unwrap(), "a");
    assert_eq!(b.wait().await.unwrap(), "a");
    assert_eq!(c.wait().await.unwrap(), "c");
    assert_eq!(tags(&log), vec!["a", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_leading_failure_is_shared_within_window() {
    let config = ThrottleConfig::new(ms(100)).with_mode(ThrottleMode::Leading);
    let throttler = Throttler::with_config(config);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(fail(&log, start, "a")).unwrap();
    sleep(ms(10)).await;
    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();

    assert!(b.wait().await.unwrap_err().to_string().contains("a failed"));
    assert_eq!(tags(&log), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_leading_reset_on_failure_reopens_window() {
    let config = ThrottleConfig::new(ms(100))
        .with_mode(ThrottleMode::Leading)
        .with_reset_on_failure(true);
    let throttler = Throttler::with_config(config);
    let log = new_log();
    let start = Instant::now();

    throttler.throttle(fail(&log, start, "a")).unwrap();
    sleep(ms(10)).await;
    let b = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();

    assert_eq!(b.wait().await.unwrap(), "b");
    assert_eq!(started_at(&log, "b"), ms(10));
}

#[test]
fn test_throttle_outside_runtime_fails() {
    let throttler: Throttler<u32> = Throttler::new(ms(10));
    assert!(matches!(
        throttler.throttle(|| ready(Ok(1))),
        Err(CoordinatorError::NoRuntime)
    ));
    assert_eq!(throttler.status(), ThrottleStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_interval_completes_and_keeps_cooling_down() {
    let log = new_log();
    let start = Instant::now();
    let throttler = Throttler::new(Duration::MAX);

    let first = throttler.throttle(record(&log, start, "a", Duration::ZERO)).unwrap();
    assert_eq!(first.wait_timeout(ms(50)).await.unwrap(), "a");
    assert_eq!(throttler.status(), ThrottleStatus::Cooldown);

    let deferred = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();
    assert!(matches!(
        deferred.wait_timeout(ms(500)).await,
        Err(CoordinatorError::Timeout)
    ));
    assert_eq!(tags(&log), vec!["a"]);

    // The deferred call can still be drained.
    assert_eq!(throttler.flush_and_dispose().await.unwrap(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_interval_from_completion_in_leading_mode() {
    let log = new_log();
    let start = Instant::now();
    let config = ThrottleConfig::new(Duration::MAX)
        .with_anchor(AnchorMode::FromCompletion)
        .with_mode(ThrottleMode::Leading);
    let throttler = Throttler::with_config(config);

    let first = throttler.throttle(record(&log, start, "a", ms(10))).unwrap();
    assert_eq!(first.wait().await.unwrap(), "a");

    let joined = throttler.throttle(record(&log, start, "b", Duration::ZERO)).unwrap();
    assert_eq!(joined.wait().await.unwrap(), "a");
    assert_eq!(throttler.status(), ThrottleStatus::Cooldown);
    assert_eq!(tags(&log), vec!["a"]);
}
