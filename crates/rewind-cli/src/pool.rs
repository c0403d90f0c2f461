use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

/// Bounded work pool. Clones share the same slots.
/// - `submit()` waits for a free slot, then runs the job on its own task
/// - `is_empty()` is true once every submitted job has finished
#[derive(Clone)]
pub struct WorkPool {
    slots: Arc<Semaphore>,
    workers: u32,
    outstanding: Arc<AtomicUsize>,
}

/// Decrements the outstanding count even if the job panics.
struct Outstanding(Arc<AtomicUsize>);

impl Drop for Outstanding {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkPool {
    pub fn new(workers: usize) -> Self {
        let workers = u32::try_from(workers.max(1)).unwrap_or(u32::MAX);
        Self {
            slots: Arc::new(Semaphore::new(workers as usize)),
            workers,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let outstanding = Outstanding(Arc::clone(&self.outstanding));

        // ignore acquire error: the semaphore is never closed
        let Ok(permit) = Arc::clone(&self.slots).acquire_owned().await else {
            return;
        };
        tokio::spawn(async move {
            let _outstanding = outstanding;
            let _permit = permit;
            job.await;
        });
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Wait until every running job has released its slot.
    pub async fn join(&self) {
        if let Ok(all) = self.slots.acquire_many(self.workers).await {
            drop(all);
        }
    }
}
