// ABOUTME: Debounce coordinator: runs the latest submitted work once submissions go quiet.
// ABOUTME: A max delay bounds how long a sustained burst can postpone execution.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::config::DebounceConfig;
use crate::error::{CoordinatorError, Outcome};
use crate::sync::{self, CellWriter, Lifecycle, ResultCell, Stopwatch, Work};

/// Observable state of a [`Debouncer`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DebounceStatus {
    /// No batch is open.
    Idle,
    /// A batch is open and waiting for the quiet period.
    Pending,
    /// The batch's work is running.
    Executing,
}

impl std::fmt::Display for DebounceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebounceStatus::Idle => write!(f, "idle"),
            DebounceStatus::Pending => write!(f, "pending"),
            DebounceStatus::Executing => write!(f, "executing"),
        }
    }
}

/// Submissions that collapse into one execution.
struct Batch<T> {
    /// Latest work item. Earlier items are dropped unrun.
    work: Option<Work<T>>,
    writer: CellWriter<T>,
    since_first: Stopwatch,
    since_last: Stopwatch,
    executing: bool,
}

struct DebounceState<T> {
    lifecycle: Lifecycle,
    batch: Option<Batch<T>>,
}

struct Inner<T> {
    config: DebounceConfig,
    state: Mutex<DebounceState<T>>,
    /// Wakes the wait loop early on disposal.
    shutdown: Notify,
}

impl<T> Inner<T> {
    fn dispose_locked(&self, state: &mut DebounceState<T>) {
        if !state.lifecycle.dispose() {
            return;
        }
        if state.batch.as_ref().is_some_and(|batch| !batch.executing) {
            warn!(
                coordinator = self.config.label(),
                "disposed with a pending batch; its waiters will not complete"
            );
        }
        debug!(coordinator = self.config.label(), "debouncer disposed");
        self.shutdown.notify_one();
    }
}

/// Debounce coordinator.
///
/// Every call to [`submit`](Debouncer::submit) made while a batch is open
/// replaces the batch's work and restarts its quiet period. When no
/// submission has arrived for `interval` (or `max_delay` has passed since the
/// batch opened), the latest work runs once and every caller of the batch
/// receives its outcome through the shared [`ResultCell`].
///
/// Submissions made while the batch is already executing join it: they
/// receive the running execution's outcome and their work is dropped.
///
/// # Disposal
///
/// [`dispose`](Debouncer::dispose) stops the wait loop but does **not**
/// complete a pending batch: its waiters stay pending forever. Call
/// [`flush_and_dispose`](Debouncer::flush_and_dispose) when callers need a
/// definite outcome on shutdown. Dropping the debouncer disposes it.
///
/// # Runtime
///
/// Opening a batch spawns a task on the current tokio runtime. Submitting
/// outside a runtime fails with [`CoordinatorError::NoRuntime`].
pub struct Debouncer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Debouncer<T> {
    /// Stop accepting work. Idempotent.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        self.inner.dispose_locked(&mut state);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().lifecycle.is_disposed()
    }

    pub fn status(&self) -> DebounceStatus {
        match self.inner.state.lock().batch.as_ref() {
            None => DebounceStatus::Idle,
            Some(batch) if batch.executing => DebounceStatus::Executing,
            Some(_) => DebounceStatus::Pending,
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.inner.config
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a debouncer with the given quiet period and no max delay.
    pub fn new(interval: Duration) -> Self {
        Self::with_config(DebounceConfig::new(interval))
    }

    pub fn with_config(config: DebounceConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(DebounceState {
                    lifecycle: Lifecycle::Active,
                    batch: None,
                }),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Submit work to the current batch, opening one if needed.
    ///
    /// Returns the batch's shared result cell immediately.
    /// Returns `Err(CoordinatorError::Disposed)` after disposal.
    pub fn submit<F, Fut>(&self, work: F) -> Result<ResultCell<T>, CoordinatorError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        state.lifecycle.ensure_active()?;

        if let Some(batch) = state.batch.as_mut() {
            if batch.executing {
                trace!(coordinator = self.inner.config.label(), "joined executing batch");
                return Ok(batch.writer.subscribe());
            }
            batch.work = Some(sync::boxed(work));
            batch.since_last.restart();
            batch.since_first.start();
            trace!(coordinator = self.inner.config.label(), "debounce batch extended");
            return Ok(batch.writer.subscribe());
        }

        let runtime = Handle::try_current().map_err(|_| CoordinatorError::NoRuntime)?;
        let (writer, cell) = sync::channel();
        state.batch = Some(Batch {
            work: Some(sync::boxed(work)),
            writer,
            since_first: Stopwatch::started(),
            since_last: Stopwatch::started(),
            executing: false,
        });
        drop(state);
        runtime.spawn(run_batch(Arc::clone(&self.inner)));

        debug!(coordinator = self.inner.config.label(), "debounce batch opened");
        Ok(cell)
    }

    /// Submit work and discard the result cell.
    pub fn submit_detached<F, Fut>(&self, work: F) -> Result<(), CoordinatorError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.submit(work).map(drop)
    }

    /// Submit work and wait for the batch outcome.
    ///
    /// Returns `Err(CoordinatorError::Cancelled)` if `cancel` completes first.
    /// Cancellation only ends this caller's wait; the batch still runs for
    /// everyone else.
    pub async fn submit_with_cancel<F, Fut, C>(&self, work: F, cancel: C) -> Outcome<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        C: Future<Output = ()>,
    {
        let cell = self.submit(work)?;
        cell.wait_with_cancel(cancel).await
    }

    /// Run pending work now, then dispose.
    ///
    /// Returns `Ok(Some(value))` with the outcome of the pending batch, or
    /// `Ok(None)` without invoking anything if no batch was waiting. A batch
    /// that is already executing is left to finish on its own.
    pub async fn flush_and_dispose(&self) -> Outcome<Option<T>> {
        let pending = {
            let mut state = self.inner.state.lock();
            let flushable = state.batch.as_ref().is_some_and(|batch| !batch.executing);
            let pending = if flushable { state.batch.take() } else { None };
            self.inner.dispose_locked(&mut state);
            pending
        };

        let Some(Batch {
            work: Some(work),
            writer,
            ..
        }) = pending
        else {
            return Ok(None);
        };

        debug!(coordinator = self.inner.config.label(), "flushing pending batch");
        let outcome = sync::execute(work).await;
        writer.complete(outcome.clone());
        outcome.map(Some)
    }
}

/// Wait for the batch to go quiet (or hit its ceiling), then run it.
async fn run_batch<T>(inner: Arc<Inner<T>>)
where
    T: Send + Sync + 'static,
{
    let label = inner.config.label();

    loop {
        let delay = {
            let state = inner.state.lock();
            let Some(batch) = state.batch.as_ref() else {
                return;
            };
            if state.lifecycle.is_disposed() {
                debug!(coordinator = label, "debounce batch abandoned");
                return;
            }

            let quiet = batch.since_last.remaining(inner.config.interval);
            let ceiling = match inner.config.max_delay {
                Some(max_delay) => batch.since_first.remaining(max_delay),
                None => Duration::MAX,
            };
            if quiet.is_zero() || ceiling.is_zero() {
                break;
            }
            quiet.min(ceiling)
        };

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = inner.shutdown.notified() => {}
        }
    }

    let work = {
        let mut state = inner.state.lock();
        if state.lifecycle.is_disposed() {
            debug!(coordinator = label, "debounce batch abandoned");
            return;
        }
        let Some(batch) = state.batch.as_mut() else {
            return;
        };
        let Some(work) = batch.work.take() else {
            return;
        };
        batch.executing = true;
        batch.since_first.reset();
        work
    };

    debug!(coordinator = label, "debounce batch executing");
    let outcome = sync::execute(work).await;
    if let Err(error) = &outcome {
        warn!(coordinator = label, %error, "debounced work failed");
    }

    let writer = inner.state.lock().batch.take().map(|batch| batch.writer);
    if let Some(writer) = writer {
        writer.complete(outcome);
    }
}
