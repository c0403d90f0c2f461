//! Fixtures shared by the app tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use super::builder::ManagerBuilder;
use super::config::ManagerConfig;
use super::manager::ProcessManager;
use crate::activity::contract::testing::{CallLog, Scripted};
use crate::domain::{
    CorrelationId, ProcessRecord, ProcessResult, ProcessState, StepOutcome, StepRecord, StoreError,
};
use crate::impls::InMemoryProcessStore;
use crate::ports::{FixedClock, ProcessStore};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Long interval so the background sweeper never fires during a test;
/// tests drive passes with `sweep_now`.
pub(crate) fn test_config() -> ManagerConfig {
    ManagerConfig {
        sweep_interval_ms: 3_600_000,
        staleness_threshold_ms: 60_000,
        stuck_report_threshold_ms: 300_000,
        retention_ms: None,
        shutdown_grace_ms: 200,
    }
}

pub(crate) struct Harness {
    pub manager: ProcessManager,
    pub store: InMemoryProcessStore,
    pub clock: Arc<FixedClock>,
    pub log: CallLog,
}

/// Started manager over an in-memory store with `Scripted` registered.
pub(crate) async fn harness() -> Harness {
    harness_with(test_config()).await
}

pub(crate) async fn harness_with(config: ManagerConfig) -> Harness {
    let store = InMemoryProcessStore::new();
    let clock = Arc::new(FixedClock::new(t0()));
    let (manager, log) = manager_over(Arc::new(store.clone()), clock.clone(), config);
    manager.start().await.unwrap();
    Harness {
        manager,
        store,
        clock,
        log,
    }
}

/// Unstarted manager over any store, as a restarted deployment would build it.
pub(crate) fn manager_over(
    store: Arc<dyn ProcessStore>,
    clock: Arc<FixedClock>,
    config: ManagerConfig,
) -> (ProcessManager, CallLog) {
    let scripted = Scripted::default();
    let log = scripted.log.clone();
    let manager = ManagerBuilder::new(store)
        .with_clock(clock)
        .with_config(config)
        .register_with(scripted)
        .unwrap()
        .build()
        .unwrap();
    (manager, log)
}

/// In-memory store whose next write of one process state fails; every other
/// call goes straight through.
pub(crate) struct LosesStateWrite {
    pub inner: InMemoryProcessStore,
    target: Mutex<Option<ProcessState>>,
}

impl LosesStateWrite {
    pub(crate) fn new(inner: InMemoryProcessStore, target: ProcessState) -> Self {
        Self {
            inner,
            target: Mutex::new(Some(target)),
        }
    }
}

#[async_trait]
impl ProcessStore for LosesStateWrite {
    async fn create(&self, record: ProcessRecord) -> Result<(), StoreError> {
        self.inner.create(record).await
    }

    async fn load(&self, correlation_id: &CorrelationId) -> Result<Option<ProcessRecord>, StoreError> {
        self.inner.load(correlation_id).await
    }

    async fn append_step(
        &self,
        correlation_id: &CorrelationId,
        step: StepRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.append_step(correlation_id, step, now).await
    }

    async fn complete_forward(
        &self,
        correlation_id: &CorrelationId,
        sequence: u32,
        fragments: ProcessResult,
        now: DateTime<Utc>,
    ) -> Result<ProcessState, StoreError> {
        self.inner
            .complete_forward(correlation_id, sequence, fragments, now)
            .await
    }

    async fn update_step_outcome(
        &self,
        correlation_id: &CorrelationId,
        sequence: u32,
        outcome: StepOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .update_step_outcome(correlation_id, sequence, outcome, now)
            .await
    }

    async fn update_state(
        &self,
        correlation_id: &CorrelationId,
        state: ProcessState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let lose = {
            let mut target = self.target.lock().unwrap();
            if *target == Some(state) {
                *target = None;
                true
            } else {
                false
            }
        };
        if lose {
            return Err(StoreError::Unavailable(format!("write of {state} lost")));
        }
        self.inner.update_state(correlation_id, state, now).await
    }

    async fn reset(&self, correlation_id: &CorrelationId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.reset(correlation_id, now).await
    }

    async fn remove(&self, correlation_id: &CorrelationId) -> Result<bool, StoreError> {
        self.inner.remove(correlation_id).await
    }

    async fn find_unmodified_since(
        &self,
        state: ProcessState,
        before: DateTime<Utc>,
    ) -> Result<Vec<CorrelationId>, StoreError> {
        self.inner.find_unmodified_since(state, before).await
    }

    async fn find_in_state(&self, state: ProcessState) -> Result<Vec<CorrelationId>, StoreError> {
        self.inner.find_in_state(state).await
    }
}
