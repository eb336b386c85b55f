// ABOUTME: Shared building blocks for the coordinators: timer, result cell, lifecycle.
// ABOUTME: Also owns the boxed work item type and its panic-safe executor.

mod lifecycle;
mod result_cell;
mod stopwatch;
mod work;

pub(crate) use lifecycle::Lifecycle;
pub(crate) use result_cell::{CellWriter, channel};
pub use result_cell::ResultCell;
pub use stopwatch::Stopwatch;
pub(crate) use work::{Work, boxed, execute};
