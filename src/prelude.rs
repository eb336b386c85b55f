// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use quiesce::prelude::*;` to get started quickly.

pub use crate::config::{AnchorMode, DebounceConfig, ThrottleConfig, ThrottleMode};
pub use crate::debounce::{DebounceStatus, Debouncer};
pub use crate::error::{CoordinatorError, Outcome};
pub use crate::sync::ResultCell;
pub use crate::throttle::{ThrottleStatus, Throttler};
