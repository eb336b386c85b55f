// ABOUTME: Root module for quiesce - debounce and throttle coordinators for async Rust.
// ABOUTME: Re-exports the coordinators, their configuration, and the shared result cell.

pub mod config;
pub mod debounce;
pub mod error;
pub mod prelude;
pub mod sync;
pub mod throttle;

pub use config::{AnchorMode, DebounceConfig, ThrottleConfig, ThrottleMode};
pub use debounce::{DebounceStatus, Debouncer};
pub use error::{CoordinatorError, Outcome};
pub use sync::{ResultCell, Stopwatch};
pub use throttle::{ThrottleStatus, Throttler};
