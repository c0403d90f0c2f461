//! In-memory process store.
//!
//! Durable only for the lifetime of the value; used by tests and the demo.
//! It can be switched "unavailable" to simulate store outages.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    CorrelationId, ProcessRecord, ProcessResult, ProcessState, StepOutcome, StepRecord, StoreError,
    TransitionError,
};
use crate::ports::ProcessStore;

/// In-memory store state.
#[derive(Default)]
struct InMemoryStoreState {
    /// All process records, keyed by correlation id.
    records: HashMap<CorrelationId, ProcessRecord>,
}

impl InMemoryStoreState {
    /// Apply `f` to a copy of the record and commit only if it succeeds.
    fn mutate<T>(
        &mut self,
        correlation_id: &CorrelationId,
        f: impl FnOnce(&mut ProcessRecord) -> Result<T, TransitionError>,
    ) -> Result<T, StoreError> {
        let record = self
            .records
            .get_mut(correlation_id)
            .ok_or_else(|| StoreError::NotFound(correlation_id.clone()))?;
        let mut updated = record.clone();
        let value = f(&mut updated).map_err(|source| StoreError::Transition {
            correlation_id: correlation_id.clone(),
            source,
        })?;
        *record = updated;
        Ok(value)
    }
}

/// In-memory `ProcessStore`.
#[derive(Clone, Default)]
pub struct InMemoryProcessStore {
    state: Arc<Mutex<InMemoryStoreState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryProcessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Overwrite a record as-is, bypassing transition checks (test fixtures).
    pub async fn insert_raw(&self, record: ProcessRecord) {
        let mut state = self.state.lock().await;
        state.records.insert(record.correlation_id.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.records.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessStore for InMemoryProcessStore {
    async fn create(&self, record: ProcessRecord) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.records.contains_key(&record.correlation_id) {
            return Err(StoreError::AlreadyExists(record.correlation_id));
        }
        state.records.insert(record.correlation_id.clone(), record);
        Ok(())
    }

    async fn load(&self, correlation_id: &CorrelationId) -> Result<Option<ProcessRecord>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.records.get(correlation_id).cloned())
    }

    async fn append_step(
        &self,
        correlation_id: &CorrelationId,
        step: StepRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.mutate(correlation_id, |rec| rec.append_step(step, now))
    }

    async fn complete_forward(
        &self,
        correlation_id: &CorrelationId,
        sequence: u32,
        fragments: ProcessResult,
        now: DateTime<Utc>,
    ) -> Result<ProcessState, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.mutate(correlation_id, |rec| {
            rec.complete_forward(sequence, fragments, now)?;
            Ok(rec.state)
        })
    }

    async fn update_step_outcome(
        &self,
        correlation_id: &CorrelationId,
        sequence: u32,
        outcome: StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.mutate(correlation_id, |rec| rec.set_step_outcome(sequence, outcome, now))
    }

    async fn update_state(
        &self,
        correlation_id: &CorrelationId,
        next: ProcessState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.mutate(correlation_id, |rec| rec.transition(next, now))
    }

    async fn reset(&self, correlation_id: &CorrelationId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.mutate(correlation_id, |rec| rec.reset(now))
    }

    async fn remove(&self, correlation_id: &CorrelationId) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.records.remove(correlation_id).is_some())
    }

    async fn find_unmodified_since(
        &self,
        wanted: ProcessState,
        before: DateTime<Utc>,
    ) -> Result<Vec<CorrelationId>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut found: Vec<&ProcessRecord> = state
            .records
            .values()
            .filter(|r| r.state == wanted && r.updated_at < before)
            .collect();
        found.sort_by_key(|r| r.updated_at);
        Ok(found.into_iter().map(|r| r.correlation_id.clone()).collect())
    }

    async fn find_in_state(&self, wanted: ProcessState) -> Result<Vec<CorrelationId>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.state == wanted)
            .map(|r| r.correlation_id.clone())
            .collect())
    }
}
