//! Single-thread worker: one loop, one job in flight, rendezvous handoff.

use std::panic::resume_unwind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{ConfigError, Result, StateError};
use crate::worker::owner::JobOwner;
use crate::worker::state::{Lifecycle, WorkerState, WorkerStatus};
use crate::worker::task::{PostProcess, TaskDescriptor, Transform};

/// State shared between the worker handle and its loop thread.
struct Shared<I, O> {
    id: Uuid,
    name: String,
    ready: AtomicBool,
    open: AtomicBool,
    jobs_completed: AtomicU64,
    work: Mutex<Option<Arc<TaskDescriptor<I, O>>>>,
    owner: Mutex<Option<Weak<dyn JobOwner>>>,
}

impl<I, O> Shared<I, O> {
    /// Clone out the current descriptor. The lock is held only for the clone.
    fn current_work(&self) -> Option<Arc<TaskDescriptor<I, O>>> {
        lock(&self.work).clone()
    }

    fn notify_owner(&self) {
        let owner = lock(&self.owner).as_ref().and_then(Weak::upgrade);
        match owner {
            Some(owner) => owner.job_done(),
            None => tracing::trace!(worker = %self.id, "No live owner to notify"),
        }
    }

    fn run(&self, jobs: Receiver<I>) {
        let span = tracing::debug_span!("worker", id = %self.id, name = %self.name);
        let _enter = span.enter();
        tracing::debug!("Worker loop started");

        // Ends when every sender is dropped.
        for job in jobs {
            self.ready.store(false, Ordering::SeqCst);

            if let Some(work) = self.current_work() {
                tracing::trace!(post_process = work.has_post_process(), "Job accepted");
                work.run(job);
            }
            let completed = self.jobs_completed.fetch_add(1, Ordering::SeqCst) + 1;
            self.notify_owner();
            tracing::debug!(completed, "Job finished");

            self.ready.store(true, Ordering::SeqCst);
        }

        self.ready.store(false, Ordering::SeqCst);
        tracing::debug!("Worker loop exited");
    }
}

/// A unit of concurrency owning exactly one background thread.
///
/// Jobs are handed over through a zero-capacity channel: [`Worker::submit`]
/// returns only once the loop has taken the value, so at most one job is
/// ever in flight. The readiness flag is advisory; the owning pool may read
/// it to pick an idle worker, but the handoff itself is what serializes jobs.
pub struct Worker<I, O> {
    shared: Arc<Shared<I, O>>,
    stack_size: Option<usize>,
    type_tag: RwLock<Vec<u8>>,
    lifecycle: Mutex<Lifecycle>,
    /// Set while `close` joins the loop thread outside the lifecycle lock.
    closing: AtomicBool,
    sender: RwLock<Option<Sender<I>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<I, O> Worker<I, O>
where
    I: Send + 'static,
    O: 'static,
{
    /// Create a closed worker with no work and no owner.
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                name: config.name,
                ready: AtomicBool::new(false),
                open: AtomicBool::new(false),
                jobs_completed: AtomicU64::new(0),
                work: Mutex::new(None),
                owner: Mutex::new(None),
            }),
            stack_size: config.stack_size,
            type_tag: RwLock::new(config.type_tag),
            lifecycle: Mutex::new(Lifecycle::new()),
            closing: AtomicBool::new(false),
            sender: RwLock::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Attach the owner that counts outstanding jobs. Only a weak reference
    /// is kept.
    pub fn with_owner<T: JobOwner + 'static>(self, owner: &Arc<T>) -> Self {
        let weak: Weak<T> = Arc::downgrade(owner);
        self.set_owner(weak);
        self
    }

    /// Replace the owner back-reference.
    pub fn set_owner(&self, owner: Weak<dyn JobOwner>) {
        *lock(&self.shared.owner) = Some(owner);
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Owner-defined capability tag.
    pub fn type_tag(&self) -> Vec<u8> {
        read(&self.type_tag).clone()
    }

    pub fn set_type_tag(&self, tag: impl Into<Vec<u8>>) {
        *write(&self.type_tag) = tag.into();
    }

    /// Replace the callback pair.
    ///
    /// `None` for `transform` keeps the current one; `post_process` is always
    /// overwritten, so `None` disables post-processing. Safe while the loop is
    /// running: the job in flight keeps the snapshot it started with and the
    /// next job sees the new one.
    pub fn set_work(
        &self,
        transform: Option<Transform<I, O>>,
        post_process: Option<PostProcess<O>>,
    ) {
        let mut work = lock(&self.shared.work);
        match TaskDescriptor::updated(work.as_deref(), transform, post_process) {
            Some(updated) => *work = Some(Arc::new(updated)),
            None => {
                tracing::debug!(
                    worker = %self.shared.id,
                    "set_work without transform on unconfigured worker"
                );
            }
        }
    }

    /// Whether a transform has been configured.
    pub fn has_work(&self) -> bool {
        self.shared.current_work().is_some()
    }

    /// Start the loop thread.
    ///
    /// Fails with [`ConfigError::WorkIsNil`] if no transform is set, leaving
    /// the worker closed.
    pub fn open(&self) -> Result<()> {
        let id = self.shared.id;
        let mut lifecycle = lock(&self.lifecycle);

        if !lifecycle.state.can_transition_to(WorkerState::Open) {
            tracing::warn!(worker = %id, "open called on an open worker");
            return Err(StateError::AlreadyOpen { id }.into());
        }
        if self.closing.load(Ordering::SeqCst) {
            tracing::warn!(worker = %id, "open called while the worker is closing");
            return Err(StateError::Closing { id }.into());
        }
        if !self.has_work() {
            return Err(ConfigError::WorkIsNil.into());
        }

        let (tx, rx) = crossbeam_channel::bounded::<I>(0);

        let mut builder = thread::Builder::new().name(self.shared.name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        self.shared.ready.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = match builder.spawn(move || shared.run(rx)) {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.ready.store(false, Ordering::SeqCst);
                return Err(StateError::SpawnFailed {
                    id,
                    reason: e.to_string(),
                }
                .into());
            }
        };

        *write(&self.sender) = Some(tx);
        *lock(&self.handle) = Some(handle);
        lifecycle
            .transition_to(WorkerState::Open)
            .map_err(|_| StateError::AlreadyOpen { id })?;
        self.shared.open.store(true, Ordering::SeqCst);

        tracing::info!(worker = %id, name = %self.shared.name, "Worker opened");
        Ok(())
    }

    /// Hand a job to the loop, blocking until the loop accepts it.
    ///
    /// Acceptance happens when the loop starts receiving, which is after any
    /// previous job on this worker has completed.
    pub fn submit(&self, job: I) -> Result<()> {
        let id = self.shared.id;
        let sender = read(&self.sender);
        let Some(tx) = sender.as_ref() else {
            return Err(StateError::NotOpen { id }.into());
        };
        tx.send(job).map_err(|_| StateError::LoopExited { id })?;
        Ok(())
    }

    /// [`submit`](Self::submit) for async callers: the blocking handoff runs
    /// on tokio's blocking pool.
    pub async fn submit_async(self: &Arc<Self>, job: I) -> Result<()> {
        let worker = Arc::clone(self);
        tokio::task::spawn_blocking(move || worker.submit(job)).await?
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// Submissions already blocked on this worker are accepted and processed
    /// before the loop exits. If a callback panicked on the loop thread, the
    /// panic is resumed here.
    ///
    /// The lifecycle lock is released before joining, so `status` stays
    /// available to callbacks and other threads during the drain; `open`
    /// fails with [`StateError::Closing`] until the join returns.
    pub fn close(&self) -> Result<()> {
        let id = self.shared.id;
        let handle = {
            let mut lifecycle = lock(&self.lifecycle);

            if !lifecycle.state.can_transition_to(WorkerState::Closed) {
                tracing::warn!(worker = %id, "close called on a closed worker");
                return Err(StateError::NotOpen { id }.into());
            }

            // Dropping the only sender closes the channel.
            drop(write(&self.sender).take());
            lifecycle
                .transition_to(WorkerState::Closed)
                .map_err(|_| StateError::NotOpen { id })?;
            self.closing.store(true, Ordering::SeqCst);
            self.shared.open.store(false, Ordering::SeqCst);
            lock(&self.handle).take()
        };

        let joined = handle.map(JoinHandle::join);
        self.closing.store(false, Ordering::SeqCst);
        if let Some(Err(payload)) = joined {
            tracing::error!(worker = %id, "Worker loop panicked");
            if !thread::panicking() {
                resume_unwind(payload);
            }
        }

        tracing::info!(
            worker = %id,
            jobs_completed = self.jobs_completed(),
            "Worker closed"
        );
        Ok(())
    }

    /// Advisory: `true` while open and between jobs.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Jobs fully processed (transform, post-process and owner notification).
    pub fn jobs_completed(&self) -> u64 {
        self.shared.jobs_completed.load(Ordering::SeqCst)
    }

    /// Snapshot for the owning pool.
    pub fn status(&self) -> WorkerStatus {
        let lifecycle = lock(&self.lifecycle);
        WorkerStatus {
            id: self.shared.id,
            name: self.shared.name.clone(),
            state: lifecycle.state,
            ready: self.is_ready(),
            jobs_completed: self.jobs_completed(),
            opened_at: lifecycle.opened_at,
            closed_at: lifecycle.closed_at,
            type_tag: self.type_tag(),
        }
    }
}

impl<I, O> Drop for Worker<I, O> {
    fn drop(&mut self) {
        drop(write(&self.sender).take());
        if let Some(handle) = lock(&self.handle).take() {
            if handle.join().is_err() {
                tracing::error!(worker = %self.shared.id, "Worker loop panicked before drop");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::error::Error;
    use crate::worker::owner::OutstandingJobs;
    use crate::worker::task::{post_process, transform};

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn open_without_work_fails_and_stays_closed() {
        let worker: Worker<i32, i32> = Worker::new(WorkerConfig::default());
        let err = worker.open().unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::WorkIsNil)));
        assert!(!worker.is_open());
        assert!(!worker.is_ready());
        assert_eq!(worker.status().state, WorkerState::Closed);
    }

    #[test]
    fn set_work_none_keeps_transform() {
        let worker: Worker<i32, i32> = Worker::new(WorkerConfig::default());
        worker.set_work(None, None);
        assert!(!worker.has_work());

        worker.set_work(Some(transform(|x: i32| x)), None);
        worker.set_work(None, None);
        assert!(worker.has_work());
    }

    #[test]
    fn open_then_ready() {
        let worker: Worker<i32, i32> = Worker::new(WorkerConfig::new("ready"));
        worker.set_work(Some(transform(|x: i32| x)), None);
        worker.open().unwrap();
        assert!(worker.is_open());
        assert!(worker.is_ready());
        worker.close().unwrap();
        assert!(!worker.is_open());
        assert!(!worker.is_ready());
    }

    #[test]
    fn double_open_and_double_close_are_state_errors() {
        let worker: Worker<i32, i32> = Worker::new(WorkerConfig::default());
        worker.set_work(Some(transform(|x: i32| x)), None);
        worker.open().unwrap();
        assert!(matches!(
            worker.open(),
            Err(Error::State(StateError::AlreadyOpen { .. }))
        ));
        worker.close().unwrap();
        assert!(matches!(
            worker.close(),
            Err(Error::State(StateError::NotOpen { .. }))
        ));
    }

    #[test]
    fn submit_after_close_is_rejected() {
        let worker: Worker<i32, i32> = Worker::new(WorkerConfig::default());
        worker.set_work(Some(transform(|x: i32| x)), None);
        assert!(matches!(
            worker.submit(1),
            Err(Error::State(StateError::NotOpen { .. }))
        ));
        worker.open().unwrap();
        worker.close().unwrap();
        assert!(matches!(
            worker.submit(1),
            Err(Error::State(StateError::NotOpen { .. }))
        ));
    }

    #[test]
    fn reopen_after_close() {
        let jobs = Arc::new(OutstandingJobs::new());
        let worker: Worker<i32, i32> = Worker::new(WorkerConfig::default()).with_owner(&jobs);
        worker.set_work(Some(transform(|x: i32| x)), None);

        for _ in 0..2 {
            worker.open().unwrap();
            jobs.add(1);
            worker.submit(1).unwrap();
            worker.close().unwrap();
        }
        assert_eq!(worker.jobs_completed(), 2);
        assert_eq!(jobs.pending(), 0);
    }

    #[test]
    fn dropped_owner_is_skipped() {
        let jobs = Arc::new(OutstandingJobs::new());
        let worker: Worker<i32, i32> = Worker::new(WorkerConfig::default()).with_owner(&jobs);
        drop(jobs);
        worker.set_work(Some(transform(|x: i32| x)), None);
        worker.open().unwrap();
        worker.submit(7).unwrap();
        worker.close().unwrap();
        assert_eq!(worker.jobs_completed(), 1);
    }

    #[test]
    fn status_reports_tag_and_timestamps() {
        let worker: Worker<i32, i32> =
            Worker::new(WorkerConfig::new("tagged").with_type_tag(b"gpu".to_vec()));
        worker.set_work(Some(transform(|x: i32| x)), None);
        worker.open().unwrap();

        let status = worker.status();
        assert_eq!(status.name, "tagged");
        assert_eq!(status.type_tag, b"gpu");
        assert_eq!(status.state, WorkerState::Open);
        assert!(status.ready);
        assert!(status.opened_at.is_some());
        assert!(status.closed_at.is_none());

        worker.set_type_tag(b"cpu".to_vec());
        assert_eq!(worker.type_tag(), b"cpu");

        worker.close().unwrap();
        assert!(worker.status().closed_at.is_some());
    }

    #[test]
    fn post_process_swapped_between_jobs() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker: Worker<i32, i32> = Worker::new(WorkerConfig::default());
        let seen_in = Arc::clone(&seen);
        worker.set_work(
            Some(transform(|x: i32| x + 100)),
            Some(post_process(move |y: i32| seen_in.lock().unwrap().push(y))),
        );
        worker.open().unwrap();
        worker.submit(1).unwrap();
        assert!(wait_until(|| worker.jobs_completed() == 1));

        worker.set_work(None, None);
        worker.submit(2).unwrap();
        worker.close().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![101]);
        assert_eq!(worker.jobs_completed(), 2);
    }

    #[test]
    fn open_while_closing_is_rejected() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let worker: Arc<Worker<i32, i32>> = Arc::new(Worker::new(WorkerConfig::default()));
        worker.set_work(
            Some(transform(move |x: i32| {
                release_rx.recv().unwrap();
                x
            })),
            None,
        );
        worker.open().unwrap();
        worker.submit(1).unwrap();

        let closer = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.close())
        };
        assert!(wait_until(|| !worker.is_open()));
        assert!(matches!(
            worker.open(),
            Err(Error::State(StateError::Closing { .. }))
        ));

        release_tx.send(()).unwrap();
        closer.join().unwrap().unwrap();
        worker.open().unwrap();
        worker.close().unwrap();
    }

    #[test]
    fn drop_joins_open_worker() {
        let done = Arc::new(AtomicBool::new(false));
        let done_in = Arc::clone(&done);
        let worker: Worker<(), ()> = Worker::new(WorkerConfig::default());
        worker.set_work(
            Some(transform(move |()| {
                thread::sleep(Duration::from_millis(20));
                done_in.store(true, Ordering::SeqCst);
            })),
            None,
        );
        worker.open().unwrap();
        worker.submit(()).unwrap();
        drop(worker);
        assert!(done.load(Ordering::SeqCst));
    }
}
