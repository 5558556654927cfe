//! Errors returned synchronously by engine operations.
//!
//! Process failures are not errors here: they land in job state and are
//! discovered through `poll`.

use crate::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The command guard rejected the command; no job was created.
    #[error("blacklisted")]
    Blacklisted,
    /// No job with this id exists (never created, or already reaped).
    #[error("not found")]
    NotFound(JobId),
    /// Removal was requested for a job that has not reached a terminal state.
    #[error("still running")]
    StillRunning(JobId),
}

pub type JobResult<T> = std::result::Result<T, JobError>;
