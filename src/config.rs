// ABOUTME: Construction-time configuration for the debounce and throttle coordinators.
// ABOUTME: Serializable so it can live in an application's config file (durations in ms).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Debouncer`](crate::Debouncer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Label recorded on log events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Quiet period required after the last submission.
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,

    /// Ceiling on the time since the first submission of a batch.
    /// `None` means unbounded.
    #[serde(
        default,
        rename = "max_delay_ms",
        with = "millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_delay: Option<Duration>,
}

impl DebounceConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            name: None,
            interval,
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("debounce")
    }
}

/// Where a throttle cooldown is measured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// `interval` runs from the start of the previous execution.
    #[default]
    FromStart,
    /// `interval` runs from the completion of the previous execution.
    FromCompletion,
}

/// How a throttle treats calls that arrive while busy or cooling down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleMode {
    /// Keep the latest call and run it when the cooldown ends. Callers in the
    /// same window share that execution's result.
    #[default]
    Trailing,
    /// Join the current window: callers receive the result of the execution
    /// that opened it and their own work is dropped.
    Leading,
}

/// Configuration for a [`Throttler`](crate::Throttler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Label recorded on log events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Minimum spacing between executions.
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,

    #[serde(default)]
    pub anchor: AnchorMode,

    /// Skip the cooldown after a failed execution.
    #[serde(default)]
    pub reset_on_failure: bool,

    #[serde(default)]
    pub mode: ThrottleMode,
}

impl ThrottleConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            name: None,
            interval,
            anchor: AnchorMode::default(),
            reset_on_failure: false,
            mode: ThrottleMode::default(),
        }
    }

    pub fn with_anchor(mut self, anchor: AnchorMode) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_reset_on_failure(mut self, reset: bool) -> Self {
        self.reset_on_failure = reset;
        self
    }

    pub fn with_mode(mut self, mode: ThrottleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("throttle")
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => super::millis::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
