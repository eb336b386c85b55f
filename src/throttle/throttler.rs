// ABOUTME: Throttle coordinator: runs work at most once per interval.
// ABOUTME: Calls made while executing or cooling down share one coalesced execution.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::{AnchorMode, ThrottleConfig, ThrottleMode};
use crate::error::{CoordinatorError, Outcome};
use crate::sync::{self, CellWriter, Lifecycle, ResultCell, Stopwatch, Work};

/// Observable state of a [`Throttler`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThrottleStatus {
    /// The next call runs immediately.
    Idle,
    /// An execution is in flight.
    Executing,
    /// Waiting out the interval after an execution.
    Cooldown,
}

impl std::fmt::Display for ThrottleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThrottleStatus::Idle => write!(f, "idle"),
            ThrottleStatus::Executing => write!(f, "executing"),
            ThrottleStatus::Cooldown => write!(f, "cooldown"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    Idle,
    Executing,
    Cooldown { until: Instant },
}

/// Latest call deferred to the next slot.
struct PendingCall<T> {
    work: Work<T>,
    writer: CellWriter<T>,
}

struct ThrottleState<T> {
    lifecycle: Lifecycle,
    phase: Phase,
    since_invocation: Stopwatch,
    /// Cell of the in-flight or most recent execution (leading mode).
    current: Option<ResultCell<T>>,
    pending: Option<PendingCall<T>>,
}

impl<T> ThrottleState<T> {
    fn status(&self) -> ThrottleStatus {
        match self.phase {
            Phase::Idle => ThrottleStatus::Idle,
            Phase::Executing => ThrottleStatus::Executing,
            Phase::Cooldown { until } if Instant::now() < until => ThrottleStatus::Cooldown,
            // The driver has not yet promoted the deferred call.
            Phase::Cooldown { .. } if self.pending.is_some() => ThrottleStatus::Cooldown,
            Phase::Cooldown { .. } => ThrottleStatus::Idle,
        }
    }
}

struct Inner<T> {
    config: ThrottleConfig,
    state: Mutex<ThrottleState<T>>,
    /// Wakes the driver out of its cooldown on disposal.
    shutdown: Notify,
    /// Held for the duration of every execution.
    gate: tokio::sync::Mutex<()>,
}

impl<T> Inner<T> {
    fn dispose_locked(&self, state: &mut ThrottleState<T>) {
        if !state.lifecycle.dispose() {
            return;
        }
        debug!(coordinator = self.config.label(), "throttler disposed");
        self.shutdown.notify_one();
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().lifecycle.is_disposed()
    }

    /// When the window opened by the execution that just finished closes.
    fn cooldown_deadline(&self, state: &mut ThrottleState<T>, failed: bool) -> Instant {
        let now = Instant::now();
        if failed && self.config.reset_on_failure {
            state.since_invocation.reset();
            return now;
        }
        match self.config.anchor {
            AnchorMode::FromStart => deadline_after(
                state.since_invocation.anchor().unwrap_or(now),
                self.config.interval,
            ),
            AnchorMode::FromCompletion => {
                state.since_invocation.restart();
                deadline_after(now, self.config.interval)
            }
        }
    }
}

/// Roughly 30 years; stands in for an interval too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + interval`, saturating to a far-future instant on overflow.
fn deadline_after(start: Instant, interval: Duration) -> Instant {
    start
        .checked_add(interval)
        .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
}

/// Throttle coordinator.
///
/// The first call while idle runs at once. After each execution the
/// throttler cools down for `interval`, measured from the execution's start
/// or completion depending on [`AnchorMode`]. What happens to calls made
/// while executing or cooling down depends on [`ThrottleMode`]:
///
/// - **Trailing:** the latest such call is kept and runs as soon as the
///   cooldown ends. Every caller of that window shares its result.
/// - **Leading:** such calls join the window's execution and receive its
///   result; their own work is dropped.
///
/// With `reset_on_failure`, a failed execution ends its cooldown at once.
///
/// Dropping the throttler disposes it. A trailing call still waiting for its
/// slot at that point is not run and its waiters do not complete; use
/// [`flush_and_dispose`](Throttler::flush_and_dispose) to run it instead.
pub struct Throttler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Throttler<T> {
    /// Stop accepting work. Idempotent.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        self.inner.dispose_locked(&mut state);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn status(&self) -> ThrottleStatus {
        self.inner.state.lock().status()
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.inner.config
    }
}

impl<T> Drop for Throttler<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> Throttler<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a trailing throttler measuring `interval` from each start.
    pub fn new(interval: Duration) -> Self {
        Self::with_config(ThrottleConfig::new(interval))
    }

    pub fn with_config(config: ThrottleConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ThrottleState {
                    lifecycle: Lifecycle::Active,
                    phase: Phase::Idle,
                    since_invocation: Stopwatch::new(),
                    current: None,
                    pending: None,
                }),
                shutdown: Notify::new(),
                gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Run `work` now if idle, otherwise coalesce it into the current window.
    ///
    /// Returns the shared result cell for whichever execution will answer
    /// this call. Returns `Err(CoordinatorError::Disposed)` after disposal.
    pub fn throttle<F, Fut>(&self, work: F) -> Result<ResultCell<T>, CoordinatorError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        state.lifecycle.ensure_active()?;
        let label = self.inner.config.label();

        match self.inner.config.mode {
            ThrottleMode::Trailing if !matches!(state.phase, Phase::Idle) => {
                if let Some(pending) = state.pending.as_mut() {
                    pending.work = sync::boxed(work);
                    trace!(coordinator = label, "pending call replaced");
                    return Ok(pending.writer.subscribe());
                }
                let (writer, cell) = sync::channel();
                state.pending = Some(PendingCall {
                    work: sync::boxed(work),
                    writer,
                });
                trace!(coordinator = label, "call deferred to next slot");
                return Ok(cell);
            }
            ThrottleMode::Leading if state.status() != ThrottleStatus::Idle => {
                if let Some(current) = state.current.as_ref() {
                    trace!(coordinator = label, "call joined current window");
                    return Ok(current.clone());
                }
            }
            _ => {}
        }

        let runtime = Handle::try_current().map_err(|_| CoordinatorError::NoRuntime)?;
        let (writer, cell) = sync::channel();
        state.phase = Phase::Executing;
        state.since_invocation.restart();
        state.current = Some(cell.clone());
        drop(state);

        debug!(coordinator = label, "throttled execution started");
        runtime.spawn(drive(Arc::clone(&self.inner), sync::boxed(work), writer));
        Ok(cell)
    }

    /// Throttle work and discard the result cell.
    pub fn throttle_detached<F, Fut>(&self, work: F) -> Result<(), CoordinatorError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.throttle(work).map(drop)
    }

    /// Throttle work and wait for the outcome of the execution answering it.
    ///
    /// Returns `Err(CoordinatorError::Cancelled)` if `cancel` completes first.
    /// The execution itself is not cancelled.
    pub async fn throttle_with_cancel<F, Fut, C>(&self, work: F, cancel: C) -> Outcome<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        C: Future<Output = ()>,
    {
        let cell = self.throttle(work)?;
        cell.wait_with_cancel(cancel).await
    }

    /// Run the deferred call now, skipping the rest of the cooldown, then dispose.
    ///
    /// Waits for an in-flight execution to finish first. Returns
    /// `Ok(None)` without invoking anything if no call was deferred.
    pub async fn flush_and_dispose(&self) -> Outcome<Option<T>> {
        let pending = {
            let mut state = self.inner.state.lock();
            let pending = state.pending.take();
            self.inner.dispose_locked(&mut state);
            pending
        };

        let Some(PendingCall { work, writer }) = pending else {
            return Ok(None);
        };

        debug!(coordinator = self.inner.config.label(), "flushing deferred call");
        let outcome = {
            let _gate = self.inner.gate.lock().await;
            sync::execute(work).await
        };
        writer.complete(outcome.clone());
        outcome.map(Some)
    }
}

/// Run an execution, cool down, and promote deferred calls until none remain.
async fn drive<T>(inner: Arc<Inner<T>>, mut work: Work<T>, mut writer: CellWriter<T>)
where
    T: Send + Sync + 'static,
{
    let label = inner.config.label();

    loop {
        let outcome = {
            let _gate = inner.gate.lock().await;
            sync::execute(work).await
        };
        let failed = outcome.is_err();
        if let Err(error) = &outcome {
            warn!(coordinator = label, %error, "throttled work failed");
        }

        let until = {
            let mut state = inner.state.lock();
            let until = inner.cooldown_deadline(&mut state, failed);
            state.phase = Phase::Cooldown { until };
            if failed && inner.config.reset_on_failure {
                state.current = None;
            }
            until
        };
        writer.complete(outcome);

        if inner.config.mode == ThrottleMode::Leading {
            return;
        }

        trace!(coordinator = label, "cooldown entered");
        loop {
            tokio::select! {
                () = tokio::time::sleep_until(until) => break,
                () = inner.shutdown.notified() => {
                    if inner.is_disposed() {
                        break;
                    }
                }
            }
        }

        let next = {
            let mut state = inner.state.lock();
            if state.lifecycle.is_disposed() {
                state.phase = Phase::Idle;
                return;
            }
            match state.pending.take() {
                Some(next) => {
                    state.phase = Phase::Executing;
                    state.since_invocation.restart();
                    state.current = Some(next.writer.subscribe());
                    next
                }
                None => {
                    state.phase = Phase::Idle;
                    return;
                }
            }
        };

        debug!(coordinator = label, "deferred call promoted");
        work = next.work;
        writer = next.writer;
    }
}
