// ABOUTME: Single-assignment, multi-reader future shared by every caller of a batch.
// ABOUTME: One writer completes it once; any number of readers await the same outcome.

use std::future::{Future, IntoFuture};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::error::{CoordinatorError, Outcome};

/// Create a connected writer and cell.
pub(crate) fn channel<T>() -> (CellWriter<T>, ResultCell<T>) {
    let (tx, rx) = watch::channel(None);
    (CellWriter { tx }, ResultCell { rx })
}

/// Producer half of a [`ResultCell`]. Owned by the coordinator.
pub(crate) struct CellWriter<T> {
    tx: watch::Sender<Option<Outcome<T>>>,
}

impl<T> CellWriter<T> {
    /// Record the outcome. Only the first completion is kept.
    ///
    /// Returns true if this call completed the cell.
    pub(crate) fn complete(&self, outcome: Outcome<T>) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    /// Hand out another reader for this cell.
    pub(crate) fn subscribe(&self) -> ResultCell<T> {
        ResultCell {
            rx: self.tx.subscribe(),
        }
    }
}

/// Shared handle to the eventual outcome of a batch or throttle window.
///
/// Every clone observes the same value or failure. Awaiting after completion
/// returns the recorded outcome immediately.
///
/// If the coordinator abandons the batch (it was disposed without a flush),
/// the cell is never completed and `wait()` stays pending. Use
/// [`ResultCell::wait_timeout`] or [`ResultCell::wait_with_cancel`] when a
/// bounded wait is required.
pub struct ResultCell<T> {
    rx: watch::Receiver<Option<Outcome<T>>>,
}

impl<T> Clone for ResultCell<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ResultCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCell")
            .field("complete", &self.rx.borrow().is_some())
            .finish()
    }
}

impl<T: Clone> ResultCell<T> {
    /// Returns true once an outcome has been recorded.
    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Read the outcome without waiting.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.rx.borrow().clone()
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> Outcome<T> {
        let mut rx = self.rx.clone();
        let recorded = match rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };

        match recorded {
            Some(outcome) => outcome,
            // Writer dropped without completing: the batch was abandoned.
            None => std::future::pending().await,
        }
    }

    /// Wait for the outcome, giving up when `cancel` completes.
    ///
    /// Cancellation only ends this caller's wait. The shared execution and
    /// every other waiter are unaffected.
    pub async fn wait_with_cancel<F>(&self, cancel: F) -> Outcome<T>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        tokio::select! {
            biased;
            () = &mut cancel => Err(CoordinatorError::Cancelled),
            outcome = self.wait() => outcome,
        }
    }

    /// Wait for the outcome for at most `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Outcome<T> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CoordinatorError::Timeout),
        }
    }
}

impl<T> IntoFuture for ResultCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Outcome<T>;
    type IntoFuture = BoxFuture<'static, Outcome<T>>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.wait().await }.boxed()
    }
}
