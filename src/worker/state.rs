//! Worker lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No loop thread; jobs are rejected.
    Closed,
    /// Loop thread running and receiving jobs.
    Open,
}

impl WorkerState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: WorkerState) -> bool {
        use WorkerState::*;

        matches!((self, target), (Closed, Open) | (Open, Closed))
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of a worker, for the owning pool's bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Unique worker ID.
    pub id: Uuid,
    /// Worker name.
    pub name: String,
    /// Current lifecycle state.
    pub state: WorkerState,
    /// Advisory readiness flag at the time of the snapshot.
    pub ready: bool,
    /// Jobs fully processed since construction.
    pub jobs_completed: u64,
    /// When the worker was last opened.
    pub opened_at: Option<DateTime<Utc>>,
    /// When the worker was last closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// Owner-defined capability tag.
    pub type_tag: Vec<u8>,
}

/// Mutable lifecycle record kept behind the worker's lifecycle lock.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    pub state: WorkerState,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Closed,
            opened_at: None,
            closed_at: None,
        }
    }

    /// Transition to a new state, stamping the matching timestamp.
    pub fn transition_to(&mut self, new_state: WorkerState) -> Result<(), WorkerState> {
        if !self.state.can_transition_to(new_state) {
            return Err(self.state);
        }
        self.state = new_state;
        match new_state {
            WorkerState::Open => self.opened_at = Some(Utc::now()),
            WorkerState::Closed => self.closed_at = Some(Utc::now()),
        }
        Ok(())
    }
}
