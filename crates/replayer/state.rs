//! Run state tracking for a replay.

use serde::{Deserialize, Serialize};

use crate::errors::ReplayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Failed,
    /// Stopped at a configured break position.
    BrokenExplicit,
    /// Failed with autobreak enabled; about to rerun up to the failure.
    BrokenAuto,
}

impl RunState {
    /// Validate and perform a state transition. Returns error for invalid transitions.
    pub fn transition_to(&self, target: RunState) -> Result<RunState, ReplayError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(ReplayError::InvalidTransition {
                from: format!("{self:?}").to_lowercase(),
                to: format!("{target:?}").to_lowercase(),
            })
        }
    }

    pub fn can_transition_to(&self, target: RunState) -> bool {
        matches!(
            (self, target),
            (RunState::Running, RunState::Completed)
                | (RunState::Running, RunState::Failed)
                | (RunState::Running, RunState::BrokenExplicit)
                | (RunState::Running, RunState::BrokenAuto)
                | (RunState::BrokenAuto, RunState::Running)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::BrokenExplicit
        )
    }
}
