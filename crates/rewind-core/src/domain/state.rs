//! Process lifecycle and step outcome state machines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a process instance.
///
/// State transitions:
/// - New -> Progressing (first forward success)
/// - Progressing -> Successful (`finished`)
/// - Progressing -> Compensated | CompensationFailed (forward failure, `failed`, sweeper)
/// - New -> Successful | Compensated (empty saga finished / abandoned)
/// - Compensated | CompensationFailed -> New (explicit reset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    /// Created, no step has succeeded yet.
    New,

    /// At least one forward step succeeded, not yet finished.
    Progressing,

    /// All steps succeeded and the caller finished the process.
    Successful,

    /// Every completed forward step was undone.
    Compensated,

    /// Compensation stopped at a failing backward step.
    CompensationFailed,
}

impl ProcessState {
    /// Is this a terminal state (no further transitions without a reset)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Successful | ProcessState::Compensated | ProcessState::CompensationFailed
        )
    }

    /// Can an operator reset this process back to `New`?
    pub fn is_resettable(self) -> bool {
        matches!(
            self,
            ProcessState::Compensated | ProcessState::CompensationFailed
        )
    }

    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (New, Progressing)
                | (New, Successful)
                | (New, Compensated)
                | (Progressing, Successful)
                | (Progressing, Compensated)
                | (Progressing, CompensationFailed)
                | (Compensated, New)
                | (CompensationFailed, New)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::New => "NEW",
            ProcessState::Progressing => "PROGRESSING",
            ProcessState::Successful => "SUCCESSFUL",
            ProcessState::Compensated => "COMPENSATED",
            ProcessState::CompensationFailed => "COMPENSATION_FAILED",
        };
        f.write_str(s)
    }
}

/// Outcome of a single logged step.
///
/// Only two moves exist: Pending -> ForwardSucceeded, and
/// ForwardSucceeded -> BackwardSucceeded | BackwardFailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    /// Logged, forward not (yet) known to have succeeded.
    Pending,
    ForwardSucceeded,
    BackwardSucceeded,
    BackwardFailed,
}

impl StepOutcome {
    pub fn can_transition_to(self, next: StepOutcome) -> bool {
        use StepOutcome::*;
        matches!(
            (self, next),
            (Pending, ForwardSucceeded)
                | (ForwardSucceeded, BackwardSucceeded)
                | (ForwardSucceeded, BackwardFailed)
        )
    }

    /// Does this step still have an applied effect that compensation must undo?
    pub fn needs_compensation(self) -> bool {
        self == StepOutcome::ForwardSucceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::new(ProcessState::New, false, false)]
    #[case::progressing(ProcessState::Progressing, false, false)]
    #[case::successful(ProcessState::Successful, true, false)]
    #[case::compensated(ProcessState::Compensated, true, true)]
    #[case::compensation_failed(ProcessState::CompensationFailed, true, true)]
    fn terminal_and_resettable(
        #[case] state: ProcessState,
        #[case] terminal: bool,
        #[case] resettable: bool,
    ) {
        assert_eq!(state.is_terminal(), terminal);
        assert_eq!(state.is_resettable(), resettable);
    }

    #[rstest]
    #[case(StepOutcome::Pending, StepOutcome::ForwardSucceeded, true)]
    #[case(StepOutcome::ForwardSucceeded, StepOutcome::BackwardSucceeded, true)]
    #[case(StepOutcome::ForwardSucceeded, StepOutcome::BackwardFailed, true)]
    #[case(StepOutcome::Pending, StepOutcome::BackwardSucceeded, false)]
    #[case(StepOutcome::BackwardSucceeded, StepOutcome::ForwardSucceeded, false)]
    #[case(StepOutcome::BackwardFailed, StepOutcome::BackwardSucceeded, false)]
    #[case(StepOutcome::ForwardSucceeded, StepOutcome::Pending, false)]
    fn step_outcome_only_moves_forward(
        #[case] from: StepOutcome,
        #[case] to: StepOutcome,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn successful_is_never_left() {
        for next in [
            ProcessState::New,
            ProcessState::Progressing,
            ProcessState::Compensated,
            ProcessState::CompensationFailed,
        ] {
            assert!(!ProcessState::Successful.can_transition_to(next));
        }
    }

    #[test]
    fn state_serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&ProcessState::CompensationFailed).unwrap();
        assert_eq!(s, "\"COMPENSATION_FAILED\"");
        assert_eq!(ProcessState::CompensationFailed.to_string(), "COMPENSATION_FAILED");

        let s = serde_json::to_string(&StepOutcome::ForwardSucceeded).unwrap();
        assert_eq!(s, "\"FORWARD_SUCCEEDED\"");
    }
}
