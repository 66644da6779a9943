//! Platform job lifecycle
//!
//! ```text
//! pending → bootstrapping → building → publishing → succeeded
//!              ↘               ↘            ↘
//!                          failed
//! ```

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Bootstrapping,
    Building,
    Publishing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// The single forward successor of a non-terminal state.
    pub fn next(self) -> Option<JobState> {
        match self {
            JobState::Pending => Some(JobState::Bootstrapping),
            JobState::Bootstrapping => Some(JobState::Building),
            JobState::Building => Some(JobState::Publishing),
            JobState::Publishing => Some(JobState::Succeeded),
            JobState::Succeeded | JobState::Failed => None,
        }
    }

    pub fn can_transition_to(self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == JobState::Failed || self.next() == Some(to)
    }

    pub fn transition(self, to: JobState) -> Result<JobState, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Bootstrapping => "bootstrapping",
            JobState::Building => "building",
            JobState::Publishing => "publishing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobState; 6] = [
        JobState::Pending,
        JobState::Bootstrapping,
        JobState::Building,
        JobState::Publishing,
        JobState::Succeeded,
        JobState::Failed,
    ];

    #[test]
    fn test_happy_path() {
        let mut state = JobState::Pending;
        for expected in [
            JobState::Bootstrapping,
            JobState::Building,
            JobState::Publishing,
            JobState::Succeeded,
        ] {
            state = state.transition(expected).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for state in ALL.iter().filter(|s| !s.is_terminal()) {
            assert_eq!(state.transition(JobState::Failed), Ok(JobState::Failed));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [JobState::Succeeded, JobState::Failed] {
            for to in ALL {
                assert!(from.transition(to).is_err(), "{from} -> {to} allowed");
            }
        }
    }

    #[test]
    fn test_steps_cannot_be_skipped() {
        assert_eq!(
            JobState::Bootstrapping.transition(JobState::Publishing),
            Err(InvalidTransition {
                from: JobState::Bootstrapping,
                to: JobState::Publishing,
            })
        );
        assert!(JobState::Pending.transition(JobState::Succeeded).is_err());
        assert!(JobState::Building.transition(JobState::Bootstrapping).is_err());
    }
}
