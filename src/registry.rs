//! Job registry: owns every job record of one engine.
//!
//! The map lock is held only to look up, insert or remove entries. Each job
//! sits behind its own mutex, so output arriving for one job never waits on
//! another.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::consts::COMMAND_PREVIEW_CHARS;
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobStatus, ShellHint};

pub type SharedJob = Arc<Mutex<Job>>;

/// One row of `list`: no buffer contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub command_preview: String,
    pub status: JobStatus,
    pub elapsed_ms: u64,
    pub output_line_count: usize,
}

impl JobSummary {
    pub fn of(job: &Job, now: Instant) -> Self {
        Self {
            id: job.id.clone(),
            command_preview: preview(&job.command),
            status: job.status(),
            elapsed_ms: millis_between(job.started_at, now),
            output_line_count: job.output_line_count(),
        }
    }
}

/// Cut a command to the preview length, on a char boundary.
pub fn preview(command: &str) -> String {
    command.chars().take(COMMAND_PREVIEW_CHARS).collect()
}

pub(crate) fn millis_between(earlier: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(earlier).as_millis() as u64
}

#[derive(Debug, Default)]
pub struct Registry {
    jobs: RwLock<HashMap<JobId, SharedJob>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a running job.
    pub async fn create(&self, command: &str, shell: ShellHint) -> (JobId, SharedJob) {
        let id = JobId::generate();
        let job = Arc::new(Mutex::new(Job::new(id.clone(), command, shell)));
        self.insert(Arc::clone(&job)).await;
        (id, job)
    }

    /// Register an already-built job under its own id.
    pub async fn insert(&self, job: SharedJob) -> JobId {
        let id = job.lock().await.id.clone();
        self.jobs.write().await.insert(id.clone(), job);
        id
    }

    pub async fn get(&self, id: &JobId) -> JobResult<SharedJob> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    /// Every job, running and terminal, oldest first.
    pub async fn list(&self) -> Vec<JobSummary> {
        let jobs: Vec<SharedJob> = self.jobs.read().await.values().cloned().collect();
        let now = Instant::now();
        let mut rows = Vec::with_capacity(jobs.len());
        for job in jobs {
            let job = job.lock().await;
            rows.push((job.started_at, JobSummary::of(&job, now)));
        }
        rows.sort_by(|(a, sa), (b, sb)| a.cmp(b).then_with(|| sa.id.cmp(&sb.id)));
        rows.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Evict a terminal job.
    pub async fn remove(&self, id: &JobId) -> JobResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get(id).ok_or_else(|| JobError::NotFound(id.clone()))?;
        if job.lock().await.status() == JobStatus::Running {
            return Err(JobError::StillRunning(id.clone()));
        }
        jobs.remove(id);
        Ok(())
    }

    /// Remove every job for which `evict` returns true. Returns the removed ids.
    pub async fn remove_where<F>(&self, mut evict: F) -> Vec<JobId>
    where
        F: FnMut(&Job) -> bool,
    {
        let mut jobs = self.jobs.write().await;
        let mut doomed = Vec::new();
        for (id, job) in jobs.iter() {
            if evict(&*job.lock().await) {
                doomed.push(id.clone());
            }
        }
        for id in &doomed {
            jobs.remove(id);
        }
        doomed
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
