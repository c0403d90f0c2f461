//! ProcessStore port - the durable step log (source of truth).
//!
//! The store persists `ProcessRecord`s. Every mutation is validated by the
//! record itself (`ProcessRecord::append_step`, `complete_forward`, ...), so
//! implementations only decide *where* the record lives, never *whether* a
//! transition is legal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    CorrelationId, ProcessRecord, ProcessResult, ProcessState, StepOutcome, StepRecord, StoreError,
};

/// ProcessStore is the single arbiter of crash consistency.
///
/// # Design
/// - A call returns only after the change is durable (for the implementation's
///   notion of durable).
/// - Each call is atomic: the record is either fully updated or unchanged.
/// - Mutations carry `now` from the engine's clock so timestamps stay
///   consistent with the sweeper's staleness checks.
/// - Per-id exclusivity is the caller's job (`ActiveProcesses`), not the store's.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Insert a new record; `AlreadyExists` if the id is taken.
    async fn create(&self, record: ProcessRecord) -> Result<(), StoreError>;

    async fn load(&self, correlation_id: &CorrelationId) -> Result<Option<ProcessRecord>, StoreError>;

    /// Append a pending step to the log.
    async fn append_step(
        &self,
        correlation_id: &CorrelationId,
        step: StepRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Mark a step forward-succeeded, merge its fragments, and return the
    /// resulting process state.
    async fn complete_forward(
        &self,
        correlation_id: &CorrelationId,
        sequence: u32,
        fragments: ProcessResult,
        now: DateTime<Utc>,
    ) -> Result<ProcessState, StoreError>;

    async fn update_step_outcome(
        &self,
        correlation_id: &CorrelationId,
        sequence: u32,
        outcome: StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_state(
        &self,
        correlation_id: &CorrelationId,
        state: ProcessState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Clear log and result and move back to `New`.
    async fn reset(&self, correlation_id: &CorrelationId, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Delete a record; `false` if there was nothing to delete.
    async fn remove(&self, correlation_id: &CorrelationId) -> Result<bool, StoreError>;

    /// Processes in `state` whose last modification is strictly before `before`.
    async fn find_unmodified_since(
        &self,
        state: ProcessState,
        before: DateTime<Utc>,
    ) -> Result<Vec<CorrelationId>, StoreError>;

    /// Every process currently in `state`, regardless of age.
    async fn find_in_state(&self, state: ProcessState) -> Result<Vec<CorrelationId>, StoreError>;
}
