//! Task descriptor: the transform / post-process pair a worker runs per job.

use std::fmt;
use std::sync::Arc;

/// Maps a job value to a result. Required before a worker can open.
pub type Transform<I, O> = Arc<dyn Fn(I) -> O + Send + Sync>;

/// Consumes a transform result. Optional.
pub type PostProcess<O> = Arc<dyn Fn(O) + Send + Sync>;

/// Wrap a closure as a [`Transform`].
pub fn transform<I, O, F>(f: F) -> Transform<I, O>
where
    F: Fn(I) -> O + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`PostProcess`].
pub fn post_process<O, F>(f: F) -> PostProcess<O>
where
    F: Fn(O) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Immutable snapshot of a worker's callbacks.
///
/// Reconfiguration builds a new snapshot and swaps it in, so a job cycle
/// always sees one complete pair.
pub struct TaskDescriptor<I, O> {
    transform: Transform<I, O>,
    post_process: Option<PostProcess<O>>,
}

impl<I, O> TaskDescriptor<I, O> {
    /// Create a descriptor from a transform and an optional post-process.
    pub fn new(transform: Transform<I, O>, post_process: Option<PostProcess<O>>) -> Self {
        Self {
            transform,
            post_process,
        }
    }

    /// Merge a `set_work` call into the previous descriptor.
    ///
    /// A missing `transform` keeps the previous one; `post_process` is always
    /// replaced, so `None` clears it. Returns `None` when there is still no
    /// transform to run.
    pub fn updated(
        previous: Option<&Self>,
        transform: Option<Transform<I, O>>,
        post_process: Option<PostProcess<O>>,
    ) -> Option<Self> {
        let transform = transform.or_else(|| previous.map(|p| Arc::clone(&p.transform)))?;
        Some(Self::new(transform, post_process))
    }

    /// Whether a post-process callback is set.
    pub fn has_post_process(&self) -> bool {
        self.post_process.is_some()
    }

    /// Run one job: transform, then post-process the result if set.
    pub fn run(&self, input: I) {
        let output = (self.transform)(input);
        if let Some(ref post) = self.post_process {
            post(output);
        }
    }
}

impl<I, O> fmt::Debug for TaskDescriptor<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("post_process", &self.post_process.is_some())
            .finish_non_exhaustive()
    }
}
