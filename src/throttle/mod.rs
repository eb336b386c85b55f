// ABOUTME: Throttle module: run work at most once per interval.
// ABOUTME: Calls arriving while busy or cooling down are coalesced.

mod throttler;

pub use throttler::{ThrottleStatus, Throttler};

#[cfg(test)]
mod throttler_test;
