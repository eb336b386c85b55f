// ABOUTME: Monotonic stopwatch used to anchor quiet periods and cooldown windows.
// ABOUTME: Built on tokio's Instant so paused test clocks drive it too.

use std::time::Duration;

use tokio::time::Instant;

/// Measures elapsed time since an anchor point.
///
/// A stopped stopwatch reports zero elapsed time. The clock is monotonic, so
/// wall-clock adjustments never shorten or extend a measured window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stopwatch {
    anchor: Option<Instant>,
}

impl Stopwatch {
    /// Create a stopped stopwatch.
    pub fn new() -> Self {
        Self { anchor: None }
    }

    /// Create a stopwatch anchored at the current instant.
    pub fn started() -> Self {
        Self {
            anchor: Some(Instant::now()),
        }
    }

    /// Anchor at the current instant, unless already running.
    pub fn start(&mut self) {
        if self.anchor.is_none() {
            self.anchor = Some(Instant::now());
        }
    }

    /// Re-anchor at the current instant.
    pub fn restart(&mut self) {
        self.anchor = Some(Instant::now());
    }

    /// Stop and clear the anchor.
    pub fn reset(&mut self) {
        self.anchor = None;
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    /// The instant the stopwatch was last anchored at, if running.
    pub fn anchor(&self) -> Option<Instant> {
        self.anchor
    }

    /// Time elapsed since the anchor, or zero when stopped.
    pub fn elapsed(&self) -> Duration {
        match self.anchor {
            Some(anchor) => Instant::now().saturating_duration_since(anchor),
            None => Duration::ZERO,
        }
    }

    /// How much of `budget` is left, clamped at zero.
    pub fn remaining(&self, budget: Duration) -> Duration {
        budget.saturating_sub(self.elapsed())
    }
}
