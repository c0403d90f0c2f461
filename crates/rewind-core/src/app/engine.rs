//! Engine - collaborators shared by processes and the sweeper, plus the
//! compensation walk both of them run.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activity::ActivityRegistry;
use crate::domain::{ProcessRecord, ProcessResult, ProcessState, StepOutcome, StoreError};
use crate::ports::{Clock, ProcessStore};

/// Result of walking a record's log backwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CompensationOutcome {
    /// Every forward-succeeded step was undone; the process is COMPENSATED.
    Compensated,
    /// A backward step failed; the process is COMPENSATION_FAILED and the
    /// steps below `sequence` keep their forward effect.
    Stopped { sequence: u32, reason: String },
}

impl CompensationOutcome {
    pub(crate) fn state(&self) -> ProcessState {
        match self {
            CompensationOutcome::Compensated => ProcessState::Compensated,
            CompensationOutcome::Stopped { .. } => ProcessState::CompensationFailed,
        }
    }
}

pub(crate) struct Engine {
    pub(crate) store: Arc<dyn ProcessStore>,
    pub(crate) registry: ActivityRegistry,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Engine {
    /// Treat the record's unresolved step (see `ProcessRecord::unresolved_step`)
    /// as applied, so the compensation walk undoes it.
    ///
    /// Only recovery calls this: the handle that ran the forward knows its
    /// outcome. Undo activities must tolerate an effect that never happened.
    pub(crate) async fn settle_unresolved(
        &self,
        record: ProcessRecord,
    ) -> Result<ProcessRecord, StoreError> {
        let Some(sequence) = record.unresolved_step() else {
            return Ok(record);
        };
        let cid = record.correlation_id;
        warn!(correlation_id = %cid, sequence, "forward outcome unknown, undoing step as if applied");
        self.store
            .complete_forward(&cid, sequence, ProcessResult::new(), self.clock.now())
            .await?;
        self.store
            .load(&cid)
            .await?
            .ok_or(StoreError::NotFound(cid))
    }

    /// Undo every FORWARD_SUCCEEDED step of `record`, highest sequence first.
    ///
    /// Each outcome is stored before moving to the next step, so an
    /// interrupted walk resumes where it stopped: undone steps are no longer
    /// FORWARD_SUCCEEDED and are skipped. A store error aborts the walk and
    /// leaves the process state as it was.
    ///
    /// A step already marked BACKWARD_FAILED ends the walk before it starts;
    /// only the COMPENSATION_FAILED state is (re)written.
    pub(crate) async fn compensate(
        &self,
        record: &ProcessRecord,
    ) -> Result<CompensationOutcome, StoreError> {
        let cid = &record.correlation_id;

        if let Some(sequence) = record.backward_failure() {
            if record.state != ProcessState::CompensationFailed {
                self.store
                    .update_state(cid, ProcessState::CompensationFailed, self.clock.now())
                    .await?;
            }
            warn!(correlation_id = %cid, sequence, "earlier undo failed, compensation stays stopped");
            return Ok(CompensationOutcome::Stopped {
                sequence,
                reason: format!("undo of step {sequence} failed in an earlier attempt"),
            });
        }

        for sequence in record.compensation_order() {
            let Some(step) = record.step(sequence) else {
                continue;
            };

            let result = match self.registry.get(&step.activity_ref) {
                Some(compensation) => compensation.backward_dyn(&step.parameters).await,
                None => Err(format!(
                    "no compensation registered for activity type {}",
                    step.activity_ref
                )
                .into()),
            };

            match result {
                Ok(()) => {
                    self.store
                        .update_step_outcome(
                            cid,
                            sequence,
                            StepOutcome::BackwardSucceeded,
                            self.clock.now(),
                        )
                        .await?;
                    debug!(correlation_id = %cid, sequence, activity = %step.activity_ref, "step compensated");
                }
                Err(failure) => {
                    let now = self.clock.now();
                    self.store
                        .update_step_outcome(cid, sequence, StepOutcome::BackwardFailed, now)
                        .await?;
                    self.store
                        .update_state(cid, ProcessState::CompensationFailed, now)
                        .await?;
                    warn!(
                        correlation_id = %cid,
                        sequence,
                        activity = %step.activity_ref,
                        reason = %failure,
                        "compensation failed, manual intervention required"
                    );
                    return Ok(CompensationOutcome::Stopped {
                        sequence,
                        reason: failure.reason().to_string(),
                    });
                }
            }
        }

        self.store
            .update_state(cid, ProcessState::Compensated, self.clock.now())
            .await?;
        info!(correlation_id = %cid, "process compensated");
        Ok(CompensationOutcome::Compensated)
    }
}
