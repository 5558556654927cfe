//! Job lifecycle notifications.
//!
//! The engine emits via [`EventBus::emit`]; anyone interested subscribes via
//! [`EventBus::subscribe`]. Built on [`tokio::sync::broadcast`] so listeners
//! are independent and a slow one never blocks job processing.

use tokio::sync::broadcast;

use crate::job::{JobId, JobStatus};

/// Events that flow out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A job was accepted and its process launch attempted.
    JobStarted { id: JobId, command: String },
    /// A job reached `done` or `error` on its own.
    JobFinished {
        id: JobId,
        status: JobStatus,
        exit_code: Option<i32>,
    },
    /// Termination was requested for a running job.
    JobKilled { id: JobId },
    /// The reaper evicted a terminal job.
    JobReaped { id: JobId },
}

#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber before the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast a lifecycle event. Returns how many subscribers got it;
    /// zero is normal when nobody is listening.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// A receiver for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
