//! ActiveProcesses - in-memory per-id exclusivity.
//!
//! At most one holder (a `Process` handle or the sweeper) per correlation id.
//! The set is only ever touched under a short `std::sync::Mutex` section that
//! never spans an `.await`; release happens in `Drop`.
//!
//! Only a guard's drop frees an id, so the set lives as long as the manager,
//! across stop and start.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use crate::domain::CorrelationId;

#[derive(Default)]
struct Inner {
    held: Mutex<HashSet<CorrelationId>>,
    released: Notify,
}

/// Shared registry of held correlation ids.
#[derive(Clone, Default)]
pub struct ActiveProcesses {
    inner: Arc<Inner>,
}

impl ActiveProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<CorrelationId>> {
        self.inner.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the id, or `None` if someone else holds it.
    pub fn try_acquire(&self, correlation_id: &CorrelationId) -> Option<ActiveGuard> {
        if !self.held().insert(correlation_id.clone()) {
            return None;
        }
        Some(ActiveGuard {
            registry: self.clone(),
            correlation_id: correlation_id.clone(),
        })
    }

    pub fn is_active(&self, correlation_id: &CorrelationId) -> bool {
        self.held().contains(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.held().len()
    }

    pub fn is_empty(&self) -> bool {
        self.held().is_empty()
    }

    /// Wait until no id is held, up to `timeout`. Returns whether it drained.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.inner.released.notified();
                tokio::pin!(notified);
                // register before checking so a release in between is not missed
                notified.as_mut().enable();
                if self.is_empty() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }

    fn release(&self, correlation_id: &CorrelationId) {
        self.held().remove(correlation_id);
        self.inner.released.notify_waiters();
    }
}

/// Holds one correlation id until dropped.
pub struct ActiveGuard {
    registry: ActiveProcesses,
    correlation_id: CorrelationId,
}

impl ActiveGuard {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.registry.release(&self.correlation_id);
    }
}

impl std::fmt::Debug for ActiveGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveGuard")
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}
