// ABOUTME: Boxed work items and the executor that turns them into outcomes.
// ABOUTME: Errors and panics from work are captured, never propagated to the loop.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::{CoordinatorError, Outcome};

/// A deferred, possibly failing computation producing `T`.
pub(crate) type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// Erase a caller-supplied closure into a [`Work`] item.
pub(crate) fn boxed<T, F, Fut>(work: F) -> Work<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Box::new(move || work().boxed())
}

/// Run a work item to completion, capturing failures and panics.
pub(crate) async fn execute<T>(work: Work<T>) -> Outcome<T> {
    match AssertUnwindSafe(async move { work().await })
        .catch_unwind()
        .await
    {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(CoordinatorError::work_failed(error)),
        Err(panic) => Err(CoordinatorError::work_failed(anyhow::anyhow!(
            "work panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
