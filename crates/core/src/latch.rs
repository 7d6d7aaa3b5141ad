//! One-way lifecycle flags.
//!
//! A [`Latch`] starts released and can be engaged exactly once. There is no
//! operation that releases it again, so `frozen` and `finalized` can only
//! move forward.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
enum LatchState {
    #[default]
    Released,
    Engaged,
}

/// Irreversible boolean flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Latch(LatchState);

impl Latch {
    /// Creates a released latch.
    #[must_use]
    pub const fn new() -> Self {
        Self(LatchState::Released)
    }

    /// Returns true once the latch has been engaged.
    #[must_use]
    pub const fn is_engaged(&self) -> bool {
        matches!(self.0, LatchState::Engaged)
    }

    /// Engages the latch. Returns false if it was already engaged.
    pub(crate) fn engage(&mut self) -> bool {
        if self.is_engaged() {
            return false;
        }
        self.0 = LatchState::Engaged;
        true
    }
}
