//! Errors and their classification.
//!
//! Three families, kept apart on purpose:
//! - saga failures: a forward step failed; the caller sees how far the undo got
//! - misuse: the caller asked for something the state machine forbids
//! - infrastructure: the store could not durably record a transition

use thiserror::Error;

use super::ids::CorrelationId;
use super::record::{ActivityRef, TransitionError};
use super::state::ProcessState;

/// Operational classification of a `ProcessError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expected saga outcome (forward failed, compensation ran).
    SagaFailure,
    /// Caller misuse; retrying the same call will fail again.
    Misuse,
    /// Store unavailable or corrupt; the sweeper reconciles later.
    Infrastructure,
}

/// Failure reported by an activity's forward or backward half.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ActivityFailure {
    reason: String,
}

impl ActivityFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<&str> for ActivityFailure {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl From<String> for ActivityFailure {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

/// Errors raised by a `ProcessStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("process {0} not found")]
    NotFound(CorrelationId),

    #[error("process {0} already exists")]
    AlreadyExists(CorrelationId),

    #[error("process {correlation_id}: {source}")]
    Transition {
        correlation_id: CorrelationId,
        #[source]
        source: TransitionError,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("store codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Errors surfaced by processes and the process manager.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Forward step failed; every earlier step was compensated.
    #[error("process {correlation_id}: step {sequence} ({activity}) failed forward, compensated: {reason}")]
    ForwardFailed {
        correlation_id: CorrelationId,
        sequence: u32,
        activity: ActivityRef,
        reason: String,
    },

    /// Forward step failed and compensation stopped at a failing backward step.
    #[error(
        "process {correlation_id}: step {failed_step} failed forward, compensation of step {compensation_step} failed: {reason}"
    )]
    CompensationFailed {
        correlation_id: CorrelationId,
        failed_step: u32,
        compensation_step: u32,
        reason: String,
    },

    #[error("process {0} is already active")]
    AlreadyActive(CorrelationId),

    #[error("process {correlation_id} is {state}, cannot {operation}")]
    InvalidState {
        correlation_id: CorrelationId,
        state: ProcessState,
        operation: &'static str,
    },

    #[error("no compensation registered for activity type {0}")]
    ActivityNotRegistered(ActivityRef),

    #[error("process manager is not running")]
    ManagerNotRunning,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::ForwardFailed { .. } | ProcessError::CompensationFailed { .. } => {
                ErrorKind::SagaFailure
            }
            ProcessError::AlreadyActive(_)
            | ProcessError::InvalidState { .. }
            | ProcessError::ActivityNotRegistered(_)
            | ProcessError::ManagerNotRunning => ErrorKind::Misuse,
            ProcessError::Store(_) => ErrorKind::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_classified() {
        let cid = CorrelationId::from("x");
        let forward = ProcessError::ForwardFailed {
            correlation_id: cid.clone(),
            sequence: 2,
            activity: ActivityRef::new("b"),
            reason: "nope".into(),
        };
        assert_eq!(forward.kind(), ErrorKind::SagaFailure);
        assert!(forward.to_string().contains("step 2"));

        assert_eq!(
            ProcessError::AlreadyActive(cid.clone()).kind(),
            ErrorKind::Misuse
        );
        assert_eq!(
            ProcessError::Store(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn activity_failure_displays_reason() {
        let failure = ActivityFailure::from("remote said no");
        assert_eq!(failure.to_string(), "remote said no");
        assert_eq!(failure.reason(), "remote said no");
    }
}
