//! rewind-core
//!
//! A compensating-transaction (saga) process manager: runs a sequence of
//! externally-effecting steps as one unit of work and, when a step fails,
//! undoes the completed ones in reverse order.
//!
//! # Modules
//! - **domain**: ids, states, the step log record, payloads, errors
//! - **activity**: the forward/backward contract and the compensation registry
//! - **ports**: `ProcessStore`, `Clock`, `IdGenerator`
//! - **impls**: in-memory and JSON-file stores
//! - **app**: manager, process handle, recovery sweeper

pub mod activity;
pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use crate::activity::{Activity, ActivityRegistry, Compensation, Forward, NoCompensation};
pub use crate::app::{
    BuildError, ManagerBuilder, ManagerConfig, Process, ProcessManager, SweepReport,
};
pub use crate::domain::{
    ActivityFailure, ActivityParameters, CorrelationId, ErrorKind, ProcessError, ProcessResult,
    ProcessState, StepOutcome, StoreError,
};
