//! RecoverySweeper - resolves processes abandoned mid-flight.
//!
//! # Pass
//! 1. PROGRESSING records, and NEW records with a logged step, untouched for
//!    `staleness_threshold`: take the process guard (skip if held), re-load,
//!    settle a step whose forward outcome is unknown, compensate
//! 2. COMPENSATION_FAILED records older than `stuck_report_threshold`:
//!    report only, never retried
//! 3. SUCCESSFUL / COMPENSATED records older than `retention`: purge
//!
//! The sweeper runs on its own task and is stopped through a watch channel,
//! the same way worker groups are.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::active::ActiveProcesses;
use super::config::ManagerConfig;
use super::engine::Engine;
use crate::domain::{CorrelationId, ProcessState, StoreError};

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Abandoned processes that were compensated, with their final state.
    pub recovered: Vec<(CorrelationId, ProcessState)>,
    /// COMPENSATION_FAILED processes waiting for an operator.
    pub stuck: Vec<CorrelationId>,
    /// Terminal records deleted after the retention period.
    pub purged: Vec<CorrelationId>,
    /// Candidates held by a live handle this pass.
    pub skipped: Vec<CorrelationId>,
    /// Candidates whose recovery hit a store error; retried next pass.
    pub errored: Vec<CorrelationId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.recovered.is_empty()
            && self.stuck.is_empty()
            && self.purged.is_empty()
            && self.skipped.is_empty()
            && self.errored.is_empty()
    }
}

pub struct RecoverySweeper {
    engine: Arc<Engine>,
    active: ActiveProcesses,
    config: ManagerConfig,
}

impl RecoverySweeper {
    pub(crate) fn new(engine: Arc<Engine>, active: ActiveProcesses, config: ManagerConfig) -> Self {
        Self {
            engine,
            active,
            config,
        }
    }

    /// Run one pass.
    ///
    /// Only the scans themselves can fail the pass; per-process errors are
    /// logged and listed in `errored`.
    pub async fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        let now = self.engine.clock.now();

        let stale_before = now - self.config.staleness_threshold();
        for state in [ProcessState::Progressing, ProcessState::New] {
            let stale = self
                .engine
                .store
                .find_unmodified_since(state, stale_before)
                .await?;
            for cid in stale {
                self.recover(cid, state, stale_before, &mut report).await;
            }
        }

        let stuck_before = now - self.config.stuck_report_threshold();
        report.stuck = self
            .engine
            .store
            .find_unmodified_since(ProcessState::CompensationFailed, stuck_before)
            .await?;
        for cid in &report.stuck {
            warn!(correlation_id = %cid, "process stuck in COMPENSATION_FAILED, needs an operator reset");
        }

        if let Some(retention) = self.config.retention() {
            let purge_before = now - retention;
            for state in [ProcessState::Successful, ProcessState::Compensated] {
                let expired = self
                    .engine
                    .store
                    .find_unmodified_since(state, purge_before)
                    .await?;
                for cid in expired {
                    self.purge(cid, &mut report).await;
                }
            }
        }

        Ok(report)
    }

    async fn recover(
        &self,
        cid: CorrelationId,
        state: ProcessState,
        stale_before: chrono::DateTime<chrono::Utc>,
        report: &mut SweepReport,
    ) {
        let Some(_guard) = self.active.try_acquire(&cid) else {
            // an idle NEW handle is not a recovery candidate
            if state == ProcessState::Progressing {
                debug!(correlation_id = %cid, "abandoned process is held, skipping");
                report.skipped.push(cid);
            }
            return;
        };

        // re-check under the guard; the record may have moved on since the scan
        let record = match self.engine.store.load(&cid).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!(correlation_id = %cid, error = %e, "loading abandoned process failed");
                report.errored.push(cid);
                return;
            }
        };
        if record.state != state || record.updated_at >= stale_before || record.steps.is_empty() {
            return;
        }

        info!(correlation_id = %cid, process_id = %record.process_id, "recovering abandoned process");
        let settled = match self.engine.settle_unresolved(record).await {
            Ok(record) => record,
            Err(e) => {
                error!(correlation_id = %cid, error = %e, "recovery interrupted, will retry");
                report.errored.push(cid);
                return;
            }
        };
        match self.engine.compensate(&settled).await {
            Ok(outcome) => report.recovered.push((cid, outcome.state())),
            Err(e) => {
                error!(correlation_id = %cid, error = %e, "recovery interrupted, will retry");
                report.errored.push(cid);
            }
        }
    }

    async fn purge(&self, cid: CorrelationId, report: &mut SweepReport) {
        let Some(_guard) = self.active.try_acquire(&cid) else {
            report.skipped.push(cid);
            return;
        };
        match self.engine.store.remove(&cid).await {
            Ok(true) => {
                debug!(correlation_id = %cid, "expired process purged");
                report.purged.push(cid);
            }
            Ok(false) => {}
            Err(e) => {
                error!(correlation_id = %cid, error = %e, "purging expired process failed");
                report.errored.push(cid);
            }
        }
    }

    /// Run passes every `sweep_interval` on a new task until shut down.
    ///
    /// The first pass runs one interval after spawning.
    pub(crate) fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        SweeperHandle { shutdown_tx, join }
    }

    async fn run(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        let period = self.config.sweep_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender gone means nobody can stop us later either
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.sweep_once().await {
                Ok(report) if report.is_empty() => debug!("sweep pass: nothing to do"),
                Ok(report) => info!(
                    recovered = report.recovered.len(),
                    stuck = report.stuck.len(),
                    purged = report.purged.len(),
                    skipped = report.skipped.len(),
                    errored = report.errored.len(),
                    "sweep pass finished"
                ),
                Err(e) => error!(error = %e, "sweep pass failed"),
            }
        }
        debug!("sweeper stopped");
    }
}

/// Handle to a spawned sweeper task.
/// - `shutdown_and_join()` stops it after the pass in progress, if any
pub(crate) struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub(crate) async fn shutdown_and_join(self) {
        // ignore send error: the task may already be gone
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "sweeper task panicked");
        }
    }
}
