//! The engine facade: one registry plus the components that act on it.
//!
//! Every operation returns promptly. `submit` hands back an id before the
//! process has produced anything; callers follow up with `poll`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::consts::SHUTDOWN_MARGIN;
use crate::error::{JobError, JobResult};
use crate::events::{Event, EventBus};
use crate::guard;
use crate::job::{JobId, JobStatus, ShellHint};
use crate::poll::{PollResult, snapshot};
use crate::reaper;
use crate::registry::{JobSummary, Registry};
use crate::runner::{RunOutput, Runner};
use crate::shell::{CandidateResolver, ShellResolver};
use crate::terminate;

pub struct JobEngine {
    registry: Arc<Registry>,
    events: Arc<EventBus>,
    runner: Runner,
    config: EngineConfig,
}

impl JobEngine {
    /// Engine probing the standard install paths for the alternate shell.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_resolver(config, Arc::new(CandidateResolver::default()))
    }

    pub fn with_resolver(config: EngineConfig, resolver: Arc<dyn ShellResolver>) -> Self {
        let events = Arc::new(EventBus::default());
        Self {
            registry: Arc::new(Registry::new()),
            runner: Runner::new(resolver, Arc::clone(&events), config.kill_grace),
            events,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Lifecycle events for this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Start the periodic reaper. Abort the handle to stop it.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        reaper::spawn(
            Arc::clone(&self.registry),
            Arc::clone(&self.events),
            self.config.reap_interval,
            self.config.retention,
        )
    }

    /// Validate and launch a command. Launch failures show up later as job
    /// status `error`; only the guard can make this fail.
    pub async fn submit(&self, command: &str, shell: ShellHint) -> JobResult<JobId> {
        if !guard::validate(command) {
            warn!(%command, "command rejected by guard");
            return Err(JobError::Blacklisted);
        }
        Ok(self.runner.start(&self.registry, command, shell).await)
    }

    /// Output from line `from_line` onward plus derived status.
    pub async fn poll(&self, id: &JobId, from_line: usize) -> JobResult<PollResult> {
        let job = self.registry.get(id).await?;
        let job = job.lock().await;
        Ok(snapshot(
            &job,
            from_line,
            Instant::now(),
            self.config.stall_threshold,
        ))
    }

    pub async fn kill(&self, id: &JobId) -> JobResult<()> {
        terminate::kill(&self.registry, &self.events, id).await
    }

    pub async fn list(&self) -> Vec<JobSummary> {
        self.registry.list().await
    }

    /// Drop a terminal job now instead of waiting for the reaper.
    pub async fn remove(&self, id: &JobId) -> JobResult<()> {
        self.registry.remove(id).await?;
        info!(job = %id, "job removed");
        Ok(())
    }

    /// Run a command to completion, bounded by the configured run timeout.
    pub async fn run_command(&self, command: &str, shell: ShellHint) -> JobResult<RunOutput> {
        if !guard::validate(command) {
            warn!(%command, "command rejected by guard");
            return Err(JobError::Blacklisted);
        }
        Ok(self
            .runner
            .run_to_completion(command, shell, self.config.run_timeout)
            .await)
    }

    /// Kill every running job and wait out the grace period so the forced
    /// kills land before the caller exits. Returns how many jobs were killed.
    pub async fn shutdown(&self) -> usize {
        let running: Vec<JobId> = self
            .list()
            .await
            .into_iter()
            .filter(|job| job.status == JobStatus::Running)
            .map(|job| job.id)
            .collect();

        for id in &running {
            // a job reaped or finished meanwhile is fine to skip
            if let Err(e) = self.kill(id).await {
                debug!(job = %id, error = %e, "kill on shutdown");
            }
        }
        if !running.is_empty() {
            info!(count = running.len(), "stopping running jobs");
            tokio::time::sleep(self.config.kill_grace + SHUTDOWN_MARGIN).await;
        }
        running.len()
    }

    /// Remove old terminal jobs now, as the reaper would.
    pub async fn reap(&self) -> Vec<JobId> {
        reaper::sweep(
            &self.registry,
            &self.events,
            self.config.retention,
            Instant::now(),
        )
        .await
    }
}

impl Default for JobEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
