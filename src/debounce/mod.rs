// ABOUTME: Debounce module: collapse bursts of submissions into one execution.
// ABOUTME: Executes after a quiet period, bounded by an optional max delay.

mod debouncer;

pub use debouncer::{DebounceStatus, Debouncer};
