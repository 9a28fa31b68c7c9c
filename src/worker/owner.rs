//! Owner capability: how a worker reports finished jobs back to its pool.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Something that tracks outstanding jobs across workers.
///
/// The owner counts a job in at submission time; the worker calls
/// [`JobOwner::job_done`] exactly once after the job's post-process returns.
pub trait JobOwner: Send + Sync {
    fn job_done(&self);
}

/// Wait-group style counter of jobs handed out but not yet finished.
#[derive(Debug, Default)]
pub struct OutstandingJobs {
    count: Mutex<usize>,
    drained: Condvar,
}

impl OutstandingJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `n` more jobs as outstanding.
    pub fn add(&self, n: usize) {
        *self.lock() += n;
    }

    /// Mark one job finished. Wakes waiters when the count reaches zero.
    pub fn done(&self) {
        let mut count = self.lock();
        match count.checked_sub(1) {
            Some(left) => *count = left,
            None => {
                tracing::warn!("OutstandingJobs::done called with no outstanding jobs");
                return;
            }
        }
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    /// Number of jobs still outstanding.
    pub fn pending(&self) -> usize {
        *self.lock()
    }

    /// Block until every outstanding job has finished.
    pub fn wait(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self
                .drained
                .wait(count)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    /// Returns `true` if the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self
                .drained
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobOwner for OutstandingJobs {
    fn job_done(&self) {
        self.done();
    }
}
