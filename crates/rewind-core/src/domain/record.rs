//! Process record: the durable step log plus state and accumulated result.
//!
//! Design:
//! - This is the single source of truth for a process instance; stores only
//!   persist it.
//! - All state transitions happen through methods here, so every store
//!   enforces the same invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ids::{CorrelationId, ProcessId};
use super::payload::{ActivityParameters, ProcessResult};
use super::state::{ProcessState, StepOutcome};

/// Stable key of a step's compensation behaviour.
///
/// Persisted with the step and resolved through the activity registry, so a
/// step can be undone by a process that never saw the original activity value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityRef(String);

impl ActivityRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Rejected mutation of a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("step sequence {got} breaks the log (expected {expected})")]
    Sequence { expected: u32, got: u32 },

    #[error("no step with sequence {0}")]
    UnknownStep(u32),

    #[error("step {sequence}: {from:?} -> {to:?} is not allowed")]
    Step {
        sequence: u32,
        from: StepOutcome,
        to: StepOutcome,
    },

    #[error("process state {from} -> {to} is not allowed")]
    State { from: ProcessState, to: ProcessState },

    #[error("process is {0}, the step log is frozen")]
    Frozen(ProcessState),
}

/// One entry of the step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based; compensation runs in reverse of this order.
    pub sequence: u32,
    pub activity_ref: ActivityRef,
    pub parameters: ActivityParameters,
    pub outcome: StepOutcome,
    pub updated_at: DateTime<Utc>,
}

impl StepRecord {
    /// A freshly logged step, before its forward runs.
    pub fn pending(
        sequence: u32,
        activity_ref: ActivityRef,
        parameters: ActivityParameters,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence,
            activity_ref,
            parameters,
            outcome: StepOutcome::Pending,
            updated_at: now,
        }
    }
}

/// Durable state of one saga instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub process_id: ProcessId,
    pub correlation_id: CorrelationId,
    pub state: ProcessState,
    pub steps: Vec<StepRecord>,
    pub result: ProcessResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessRecord {
    pub fn new(process_id: ProcessId, correlation_id: CorrelationId, now: DateTime<Utc>) -> Self {
        Self {
            process_id,
            correlation_id,
            state: ProcessState::New,
            steps: Vec::new(),
            result: ProcessResult::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sequence number the next logged step must carry.
    pub fn next_sequence(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    pub fn step(&self, sequence: u32) -> Option<&StepRecord> {
        sequence
            .checked_sub(1)
            .and_then(|idx| self.steps.get(idx as usize))
    }

    /// Sequences still holding an applied forward effect, highest first.
    pub fn compensation_order(&self) -> Vec<u32> {
        self.steps
            .iter()
            .rev()
            .filter(|s| s.outcome.needs_compensation())
            .map(|s| s.sequence)
            .collect()
    }

    /// Step whose undo already failed. Once set, compensation must not go below it.
    pub fn backward_failure(&self) -> Option<u32> {
        self.steps
            .iter()
            .find(|s| s.outcome == StepOutcome::BackwardFailed)
            .map(|s| s.sequence)
    }

    /// Last step if it is still PENDING and no undo has started yet.
    ///
    /// Its forward may have run without being recorded (crash or store error
    /// between the two writes). Once an undo has been logged, a trailing
    /// PENDING step is the one whose forward failed and is not unresolved.
    pub fn unresolved_step(&self) -> Option<u32> {
        let undo_started = self.steps.iter().any(|s| {
            matches!(
                s.outcome,
                StepOutcome::BackwardSucceeded | StepOutcome::BackwardFailed
            )
        });
        if undo_started {
            return None;
        }
        self.steps
            .last()
            .filter(|s| s.outcome == StepOutcome::Pending)
            .map(|s| s.sequence)
    }

    /// Log a new pending step.
    pub fn append_step(&mut self, step: StepRecord, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Frozen(self.state));
        }
        let expected = self.next_sequence();
        if step.sequence != expected {
            return Err(TransitionError::Sequence {
                expected,
                got: step.sequence,
            });
        }
        if step.outcome != StepOutcome::Pending {
            return Err(TransitionError::Step {
                sequence: step.sequence,
                from: StepOutcome::Pending,
                to: step.outcome,
            });
        }
        self.steps.push(step);
        self.updated_at = now;
        Ok(())
    }

    /// Mark a pending step as forward-succeeded and merge its result fragments.
    ///
    /// The first forward success moves the process from New to Progressing.
    pub fn complete_forward(
        &mut self,
        sequence: u32,
        fragments: ProcessResult,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Frozen(self.state));
        }
        self.set_step_outcome(sequence, StepOutcome::ForwardSucceeded, now)?;
        self.result.merge(fragments);
        if self.state == ProcessState::New {
            self.state = ProcessState::Progressing;
        }
        Ok(())
    }

    /// Move one step to a new outcome (validated).
    pub fn set_step_outcome(
        &mut self,
        sequence: u32,
        outcome: StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Frozen(self.state));
        }
        let step = sequence
            .checked_sub(1)
            .and_then(|idx| self.steps.get_mut(idx as usize))
            .ok_or(TransitionError::UnknownStep(sequence))?;
        if !step.outcome.can_transition_to(outcome) {
            return Err(TransitionError::Step {
                sequence,
                from: step.outcome,
                to: outcome,
            });
        }
        step.outcome = outcome;
        step.updated_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// Move the process to a new state (validated).
    pub fn transition(&mut self, next: ProcessState, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::State {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    /// Clear the log and result and go back to New (only from a resettable state).
    pub fn reset(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(ProcessState::New, now)?;
        self.steps.clear();
        self.result.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn record() -> ProcessRecord {
        ProcessRecord::new(ProcessId::from_ulid(Ulid::new()), CorrelationId::from("x"), now())
    }

    fn pending(seq: u32) -> StepRecord {
        StepRecord::pending(seq, ActivityRef::new("test.a"), ActivityParameters::new(), now())
    }

    #[test]
    fn new_record_starts_as_new_and_empty() {
        let rec = record();
        assert_eq!(rec.state, ProcessState::New);
        assert!(rec.steps.is_empty());
        assert_eq!(rec.next_sequence(), 1);
    }

    #[test]
    fn sequences_must_be_contiguous() {
        let mut rec = record();
        rec.append_step(pending(1), now()).unwrap();

        assert_eq!(
            rec.append_step(pending(3), now()),
            Err(TransitionError::Sequence { expected: 2, got: 3 })
        );
        assert_eq!(
            rec.append_step(pending(1), now()),
            Err(TransitionError::Sequence { expected: 2, got: 1 })
        );
        rec.append_step(pending(2), now()).unwrap();
        assert_eq!(rec.steps.len(), 2);
    }

    #[test]
    fn first_forward_success_moves_to_progressing() {
        let mut rec = record();
        rec.append_step(pending(1), now()).unwrap();

        let mut fragments = ProcessResult::new();
        fragments.add("a");
        rec.complete_forward(1, fragments, now()).unwrap();

        assert_eq!(rec.state, ProcessState::Progressing);
        assert_eq!(rec.steps[0].outcome, StepOutcome::ForwardSucceeded);
        assert_eq!(rec.result.len(), 1);
    }

    #[test]
    fn compensation_order_skips_pending_and_undone_steps() {
        let mut rec = record();
        for seq in 1..=4 {
            rec.append_step(pending(seq), now()).unwrap();
        }
        rec.complete_forward(1, ProcessResult::new(), now()).unwrap();
        rec.complete_forward(2, ProcessResult::new(), now()).unwrap();
        rec.complete_forward(3, ProcessResult::new(), now()).unwrap();
        rec.set_step_outcome(3, StepOutcome::BackwardSucceeded, now())
            .unwrap();

        // step 4 is still pending (its forward failed)
        assert_eq!(rec.compensation_order(), vec![2, 1]);
    }

    #[test]
    fn terminal_record_freezes_log() {
        let mut rec = record();
        rec.append_step(pending(1), now()).unwrap();
        rec.complete_forward(1, ProcessResult::new(), now()).unwrap();
        rec.transition(ProcessState::Successful, now()).unwrap();

        assert_eq!(
            rec.append_step(pending(2), now()),
            Err(TransitionError::Frozen(ProcessState::Successful))
        );
        assert!(rec.reset(now()).is_err());
        assert_eq!(
            rec.set_step_outcome(1, StepOutcome::BackwardSucceeded, now()),
            Err(TransitionError::Frozen(ProcessState::Successful))
        );
        assert_eq!(rec.steps[0].outcome, StepOutcome::ForwardSucceeded);
    }

    #[test]
    fn unresolved_step_is_a_trailing_pending_before_any_undo() {
        let mut rec = record();
        rec.append_step(pending(1), now()).unwrap();
        assert_eq!(rec.unresolved_step(), Some(1));

        rec.complete_forward(1, ProcessResult::new(), now()).unwrap();
        assert_eq!(rec.unresolved_step(), None);
        rec.append_step(pending(2), now()).unwrap();
        assert_eq!(rec.unresolved_step(), Some(2));

        // step 2 failed forward and the walk already undid step 1
        rec.set_step_outcome(1, StepOutcome::BackwardSucceeded, now())
            .unwrap();
        assert_eq!(rec.unresolved_step(), None);
    }

    #[test]
    fn backward_failure_is_found_anywhere_in_the_log() {
        let mut rec = record();
        for seq in 1..=3 {
            rec.append_step(pending(seq), now()).unwrap();
            rec.complete_forward(seq, ProcessResult::new(), now()).unwrap();
        }
        assert_eq!(rec.backward_failure(), None);

        rec.set_step_outcome(3, StepOutcome::BackwardSucceeded, now())
            .unwrap();
        rec.set_step_outcome(2, StepOutcome::BackwardFailed, now())
            .unwrap();
        assert_eq!(rec.backward_failure(), Some(2));
        // step 1 still holds its effect, but the walk must not reach it
        assert_eq!(rec.compensation_order(), vec![1]);
    }

    #[test]
    fn reset_clears_log_and_result() {
        let mut rec = record();
        rec.append_step(pending(1), now()).unwrap();
        let mut fragments = ProcessResult::new();
        fragments.add(1);
        rec.complete_forward(1, fragments, now()).unwrap();
        rec.set_step_outcome(1, StepOutcome::BackwardSucceeded, now())
            .unwrap();
        rec.transition(ProcessState::Compensated, now()).unwrap();

        rec.reset(now()).unwrap();

        assert_eq!(rec.state, ProcessState::New);
        assert!(rec.steps.is_empty());
        assert!(rec.result.is_empty());
    }

    #[test]
    fn unknown_step_is_rejected() {
        let mut rec = record();
        assert_eq!(
            rec.set_step_outcome(0, StepOutcome::ForwardSucceeded, now()),
            Err(TransitionError::UnknownStep(0))
        );
        assert_eq!(
            rec.set_step_outcome(7, StepOutcome::ForwardSucceeded, now()),
            Err(TransitionError::UnknownStep(7))
        );
    }
}
