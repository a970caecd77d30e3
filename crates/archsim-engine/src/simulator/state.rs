//! Run lifecycle
//!
//! ```text
//! Idle -> Running -> Completed
//!                 \-> Aborted
//! ```
//!
//! `Completed` and `Aborted` are terminal.

use crate::error::InternalError;
use serde::{Deserialize, Serialize};

/// State of one simulation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Inputs accepted, no tick executed
    #[default]
    Idle,
    /// Ticks in progress
    Running,
    /// Every tick executed
    Completed,
    /// Stopped by an error or cancellation
    Aborted,
}

impl RunState {
    /// States reachable in one step
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Idle => &[Self::Running, Self::Aborted],
            Self::Running => &[Self::Completed, Self::Aborted],
            Self::Completed | Self::Aborted => &[],
        }
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// Validate a transition
///
/// # Errors
/// Returns [`InternalError::IllegalTransition`] when `to` is not reachable
/// from `from`
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), InternalError> {
    if from.allowed_transitions().contains(&to) {
        Ok(())
    } else {
        Err(InternalError::IllegalTransition { from, to })
    }
}

/// Current state plus checked transitions
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStateMachine {
    state: RunState,
}

impl RunStateMachine {
    /// Start in [`RunState::Idle`]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns error on an illegal transition; the state is unchanged
    pub fn transition(&mut self, to: RunState) -> Result<(), InternalError> {
        validate_transition(self.state, to)?;
        tracing::trace!(from = ?self.state, ?to, "run state transition");
        self.state = to;
        Ok(())
    }
}
