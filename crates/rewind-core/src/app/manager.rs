//! ProcessManager - creates processes and answers operator queries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::active::ActiveProcesses;
use super::config::ManagerConfig;
use super::engine::Engine;
use super::process::Process;
use super::sweeper::{RecoverySweeper, SweepReport, SweeperHandle};
use crate::domain::{
    CorrelationId, ProcessError, ProcessRecord, ProcessResult, ProcessState, StoreError,
};
use crate::ports::IdGenerator;

struct ManagerInner {
    engine: Arc<Engine>,
    ids: Arc<dyn IdGenerator>,
    active: ActiveProcesses,
    config: ManagerConfig,
    running: AtomicBool,
    sweeper: Mutex<Option<SweeperHandle>>,
}

/// Entry point of the engine. Cheap to clone; clones share everything.
///
/// # Lifecycle
/// ```ignore
/// let manager = ManagerBuilder::new(store).register::<CancelHotel>()?.build()?;
/// manager.start().await?;
/// let mut process = manager.new_process("order-42").await?;
/// process.execute(&BookHotel, params).await?;
/// process.finished().await?;
/// manager.stop().await;
/// ```
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<ManagerInner>,
}

impl ProcessManager {
    pub(crate) fn new(engine: Engine, ids: Arc<dyn IdGenerator>, config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                engine: Arc::new(engine),
                ids,
                active: ActiveProcesses::new(),
                config,
                running: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Registered compensation types.
    pub fn activity_types(&self) -> Vec<String> {
        self.inner.engine.registry.registered_types()
    }

    /// Open a process for `correlation_id`.
    ///
    /// | stored state        | result                                  |
    /// |---------------------|-----------------------------------------|
    /// | none                | new NEW record                          |
    /// | NEW, empty log      | adopted                                 |
    /// | NEW with a step     | `AlreadyActive` (left to the sweeper)   |
    /// | PROGRESSING         | `AlreadyActive` (left to the sweeper)   |
    /// | COMPENSATED         | reset, then adopted                     |
    /// | COMPENSATION_FAILED | `InvalidState` (operator reset first)   |
    /// | SUCCESSFUL          | `InvalidState`                          |
    pub async fn new_process(
        &self,
        correlation_id: impl Into<CorrelationId>,
    ) -> Result<Process, ProcessError> {
        if !self.is_running() {
            return Err(ProcessError::ManagerNotRunning);
        }
        let cid = correlation_id.into();
        let guard = self
            .inner
            .active
            .try_acquire(&cid)
            .ok_or_else(|| ProcessError::AlreadyActive(cid.clone()))?;

        let engine = &self.inner.engine;
        let record = match engine.store.load(&cid).await? {
            None => {
                let record = ProcessRecord::new(
                    self.inner.ids.generate_process_id(),
                    cid.clone(),
                    engine.clock.now(),
                );
                engine.store.create(record.clone()).await?;
                debug!(correlation_id = %cid, process_id = %record.process_id, "process created");
                record
            }
            Some(record) => match record.state {
                ProcessState::New if record.steps.is_empty() => record,
                // a step was logged by a run that never came back
                ProcessState::New | ProcessState::Progressing => {
                    return Err(ProcessError::AlreadyActive(cid));
                }
                ProcessState::Compensated => {
                    engine.store.reset(&cid, engine.clock.now()).await?;
                    debug!(correlation_id = %cid, "compensated process reset for a new run");
                    engine
                        .store
                        .load(&cid)
                        .await?
                        .ok_or_else(|| StoreError::NotFound(cid.clone()))?
                }
                state => {
                    return Err(ProcessError::InvalidState {
                        correlation_id: cid,
                        state,
                        operation: "start a new process",
                    });
                }
            },
        };

        Ok(Process::new(
            Arc::clone(engine),
            record.process_id,
            cid,
            record.state,
            record.next_sequence(),
            guard,
        ))
    }

    /// Current state, or `None` if no such process. Never mutates.
    pub async fn get_process_status(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<ProcessState>, ProcessError> {
        let record = self.inner.engine.store.load(correlation_id).await?;
        Ok(record.map(|r| r.state))
    }

    /// Accumulated result; only visible once the process is SUCCESSFUL.
    pub async fn get_process_result(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<ProcessResult>, ProcessError> {
        let record = self.inner.engine.store.load(correlation_id).await?;
        Ok(record
            .filter(|r| r.state == ProcessState::Successful)
            .map(|r| r.result))
    }

    /// Full record snapshot, for operators deciding on a reset.
    pub async fn inspect_process(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<ProcessRecord>, ProcessError> {
        Ok(self.inner.engine.store.load(correlation_id).await?)
    }

    /// Clear a COMPENSATED or COMPENSATION_FAILED process back to NEW.
    ///
    /// Returns `false` (and changes nothing) for any other state, for an
    /// unknown id, or while the id is held.
    pub async fn reset_process(&self, correlation_id: &CorrelationId) -> Result<bool, ProcessError> {
        let Some(_guard) = self.inner.active.try_acquire(correlation_id) else {
            return Ok(false);
        };
        let engine = &self.inner.engine;
        let Some(record) = engine.store.load(correlation_id).await? else {
            return Ok(false);
        };
        if !record.state.is_resettable() {
            return Ok(false);
        }
        engine.store.reset(correlation_id, engine.clock.now()).await?;
        info!(correlation_id = %correlation_id, from = %record.state, "process reset");
        Ok(true)
    }

    /// Open for new processes and start the recovery sweeper.
    ///
    /// Calling it on a running manager does nothing. Handles that outlived a
    /// `stop()` keep their ids; neither the sweeper nor `new_process` can take
    /// them until the handles are dropped.
    pub async fn start(&self) -> Result<(), ProcessError> {
        let mut sweeper = self.inner.sweeper.lock().await;
        if self.is_running() {
            return Ok(());
        }

        let abandoned = self
            .inner
            .engine
            .store
            .find_in_state(ProcessState::Progressing)
            .await?;
        if !abandoned.is_empty() {
            info!(count = abandoned.len(), "progressing processes found, awaiting recovery");
        }

        *sweeper = Some(self.sweeper().spawn());
        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            sweep_interval_ms = self.inner.config.sweep_interval_ms,
            staleness_threshold_ms = self.inner.config.staleness_threshold_ms,
            "process manager started"
        );
        Ok(())
    }

    /// Stop accepting processes, stop the sweeper, and wait up to
    /// `shutdown_grace` for open handles to be dropped.
    ///
    /// Returns `false` if handles were still open when the grace ran out.
    pub async fn stop(&self) -> bool {
        let mut sweeper = self.inner.sweeper.lock().await;
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = sweeper.take() {
            handle.shutdown_and_join().await;
        }

        let drained = self
            .inner
            .active
            .wait_drained(self.inner.config.shutdown_grace())
            .await;
        if drained {
            info!("process manager stopped");
        } else {
            warn!(
                open = self.inner.active.len(),
                "process manager stopped with open process handles"
            );
        }
        drained
    }

    /// Run one sweeper pass now, independent of the background schedule.
    pub async fn sweep_now(&self) -> Result<SweepReport, ProcessError> {
        Ok(self.sweeper().sweep_once().await?)
    }

    fn sweeper(&self) -> RecoverySweeper {
        RecoverySweeper::new(
            Arc::clone(&self.inner.engine),
            self.inner.active.clone(),
            self.inner.config.clone(),
        )
    }
}
