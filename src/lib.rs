//! Slave worker — single-thread job consumer with rendezvous handoff.

pub mod config;
pub mod error;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use worker::{JobOwner, OutstandingJobs, Worker, WorkerState, WorkerStatus};
