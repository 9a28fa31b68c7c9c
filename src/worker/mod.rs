//! Worker core — one background thread consuming jobs one at a time.
//!
//! Core components:
//! - `task` — Task descriptor (transform + optional post-process)
//! - `state` — Lifecycle state machine (Closed ⇄ Open) and status snapshots
//! - `owner` — Back-reference capability for the owning pool
//! - `worker` — The worker itself (open, submit, close, readiness)

pub mod owner;
pub mod state;
pub mod task;
pub mod worker;

pub use owner::{JobOwner, OutstandingJobs};
pub use state::{WorkerState, WorkerStatus};
pub use task::{PostProcess, TaskDescriptor, Transform, post_process, transform};
pub use worker::Worker;
