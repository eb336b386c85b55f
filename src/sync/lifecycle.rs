// ABOUTME: Active/Disposed lifecycle flag guarded alongside coordinator state.
// ABOUTME: Disposal is terminal and only the first transition reports success.

use crate::error::CoordinatorError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    #[default]
    Active,
    Disposed,
}

impl Lifecycle {
    /// Reject new work once disposed.
    pub(crate) fn ensure_active(self) -> Result<(), CoordinatorError> {
        match self {
            Lifecycle::Active => Ok(()),
            Lifecycle::Disposed => Err(CoordinatorError::Disposed),
        }
    }

    pub(crate) fn is_disposed(self) -> bool {
        self == Lifecycle::Disposed
    }

    /// Move to Disposed. Returns true only for the first call.
    pub(crate) fn dispose(&mut self) -> bool {
        let first = *self == Lifecycle::Active;
        *self = Lifecycle::Disposed;
        first
    }
}
