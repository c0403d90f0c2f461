//! Process - handle for one running saga instance.
//!
//! # Protocol per step
//! 1. reject if the process is terminal or the compensation type is unknown
//! 2. durably append a PENDING step
//! 3. run forward into a fresh result buffer
//! 4. success: mark FORWARD_SUCCEEDED and merge the buffer (one store call)
//! 5. failure: walk the log backwards and report how far the undo got
//!
//! Steps 2 and 4 bracket the external effect, so after a crash the log tells
//! the sweeper exactly which steps need undoing.
//!
//! If step 4 cannot be stored, the handle keeps the forward outcome and
//! records it before doing anything else (next step, finish or undo).

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::active::ActiveGuard;
use super::engine::{CompensationOutcome, Engine};
use crate::activity::{Activity, Compensation, Forward, NoCompensation};
use crate::domain::{
    ActivityParameters, ActivityRef, CorrelationId, ProcessError, ProcessId, ProcessResult,
    ProcessState, StepRecord, StoreError,
};

/// Exclusive handle on a process; obtained from `ProcessManager::new_process`.
///
/// Dropping the handle releases the correlation id. A handle dropped while
/// PROGRESSING leaves the process to the recovery sweeper.
pub struct Process {
    engine: Arc<Engine>,
    process_id: ProcessId,
    correlation_id: CorrelationId,
    state: ProcessState,
    next_sequence: u32,
    /// Forward success seen by this handle but not yet stored.
    unconfirmed: Option<Unconfirmed>,
    _guard: ActiveGuard,
}

struct Unconfirmed {
    sequence: u32,
    fragments: ProcessResult,
}

impl Process {
    pub(crate) fn new(
        engine: Arc<Engine>,
        process_id: ProcessId,
        correlation_id: CorrelationId,
        state: ProcessState,
        next_sequence: u32,
        guard: ActiveGuard,
    ) -> Self {
        Self {
            engine,
            process_id,
            correlation_id,
            state,
            next_sequence,
            unconfirmed: None,
            _guard: guard,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// State as last written by this handle.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Run an activity that carries its own compensation.
    pub async fn execute<A: Activity>(
        &mut self,
        activity: &A,
        params: ActivityParameters,
    ) -> Result<(), ProcessError> {
        self.run_step(activity, A::activity_ref(), params).await
    }

    /// Run `forward`, logging `C` as its compensation.
    ///
    /// # Compensation instance
    /// Only the type of `compensation` matters. The step is logged under
    /// `C::TYPE` and undone by the instance registered for that type (see
    /// `ManagerBuilder::register_with`), both here and after a crash. State
    /// the undo needs belongs in `params`, not in the value passed here.
    pub async fn execute_with<F: Forward, C: Compensation>(
        &mut self,
        forward: &F,
        _compensation: &C,
        params: ActivityParameters,
    ) -> Result<(), ProcessError> {
        self.run_step(forward, C::activity_ref(), params).await
    }

    /// Run a step with nothing to undo.
    pub async fn execute_forward_only<F: Forward>(
        &mut self,
        forward: &F,
        params: ActivityParameters,
    ) -> Result<(), ProcessError> {
        self.run_step(forward, NoCompensation::activity_ref(), params)
            .await
    }

    async fn run_step(
        &mut self,
        forward: &dyn Forward,
        activity_ref: ActivityRef,
        params: ActivityParameters,
    ) -> Result<(), ProcessError> {
        if self.state.is_terminal() {
            return Err(self.invalid_state("execute"));
        }
        if !self.engine.registry.contains(&activity_ref) {
            return Err(ProcessError::ActivityNotRegistered(activity_ref));
        }
        self.confirm().await?;

        let sequence = self.next_sequence;
        let now = self.engine.clock.now();
        let step = StepRecord::pending(sequence, activity_ref.clone(), params.clone(), now);
        self.engine
            .store
            .append_step(&self.correlation_id, step, now)
            .await?;
        self.next_sequence += 1;
        debug!(correlation_id = %self.correlation_id, sequence, activity = %activity_ref, "step logged");

        let mut buffer = ProcessResult::new();
        match forward.forward(&params, &mut buffer).await {
            Ok(()) => {
                self.unconfirmed = Some(Unconfirmed {
                    sequence,
                    fragments: buffer,
                });
                self.confirm().await?;
                debug!(correlation_id = %self.correlation_id, sequence, "forward succeeded");
                Ok(())
            }
            Err(failure) => {
                warn!(
                    correlation_id = %self.correlation_id,
                    sequence,
                    activity = %activity_ref,
                    reason = %failure,
                    "forward failed, compensating"
                );
                match self.compensate().await? {
                    CompensationOutcome::Compensated => Err(ProcessError::ForwardFailed {
                        correlation_id: self.correlation_id.clone(),
                        sequence,
                        activity: activity_ref,
                        reason: failure.reason().to_string(),
                    }),
                    CompensationOutcome::Stopped {
                        sequence: compensation_step,
                        reason,
                    } => Err(ProcessError::CompensationFailed {
                        correlation_id: self.correlation_id.clone(),
                        failed_step: sequence,
                        compensation_step,
                        reason,
                    }),
                }
            }
        }
    }

    /// Mark the saga complete.
    ///
    /// Allowed from PROGRESSING, or from NEW when no step was logged.
    pub async fn finished(&mut self) -> Result<(), ProcessError> {
        if !self.state.is_terminal() {
            self.confirm().await?;
        }
        let allowed = match self.state {
            ProcessState::Progressing => true,
            ProcessState::New => self.next_sequence == 1,
            _ => false,
        };
        if !allowed {
            return Err(self.invalid_state("finish"));
        }
        self.engine
            .store
            .update_state(&self.correlation_id, ProcessState::Successful, self.engine.clock.now())
            .await?;
        self.state = ProcessState::Successful;
        info!(correlation_id = %self.correlation_id, steps = self.next_sequence - 1, "process successful");
        Ok(())
    }

    /// Abandon the saga and undo every applied step.
    ///
    /// Returns the resulting state: COMPENSATED, or COMPENSATION_FAILED if an
    /// undo failed. Calling it again on a compensated process is a no-op.
    pub async fn failed(&mut self) -> Result<ProcessState, ProcessError> {
        match self.state {
            ProcessState::Compensated | ProcessState::CompensationFailed => Ok(self.state),
            ProcessState::Successful => Err(self.invalid_state("fail")),
            ProcessState::New | ProcessState::Progressing => {
                self.compensate().await?;
                Ok(self.state)
            }
        }
    }

    /// Store the forward outcome a previous store error kept in memory.
    async fn confirm(&mut self) -> Result<(), ProcessError> {
        let Some(pending) = &self.unconfirmed else {
            return Ok(());
        };
        self.state = self
            .engine
            .store
            .complete_forward(
                &self.correlation_id,
                pending.sequence,
                pending.fragments.clone(),
                self.engine.clock.now(),
            )
            .await?;
        self.unconfirmed = None;
        Ok(())
    }

    async fn compensate(&mut self) -> Result<CompensationOutcome, ProcessError> {
        self.confirm().await?;
        let record = self
            .engine
            .store
            .load(&self.correlation_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(self.correlation_id.clone()))?;
        let outcome = self.engine.compensate(&record).await?;
        self.state = outcome.state();
        Ok(outcome)
    }

    fn invalid_state(&self, operation: &'static str) -> ProcessError {
        ProcessError::InvalidState {
            correlation_id: self.correlation_id.clone(),
            state: self.state,
            operation,
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.state == ProcessState::Progressing || self.unconfirmed.is_some() {
            warn!(
                correlation_id = %self.correlation_id,
                "process handle dropped while progressing; left to the recovery sweeper"
            );
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("process_id", &self.process_id)
            .field("correlation_id", &self.correlation_id)
            .field("state", &self.state)
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}
