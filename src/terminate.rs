//! Termination controller.

use tracing::{debug, info};

use crate::error::JobResult;
use crate::events::{Event, EventBus};
use crate::job::{JobId, StopRequest};
use crate::registry::Registry;

/// Mark a job `killed` and ask its supervisor to stop the process: SIGTERM
/// now, SIGKILL once the grace period passes. `killed` records intent; the
/// process may still be shutting down when this returns. Killing a job that
/// is already terminal succeeds without doing anything.
pub async fn kill(registry: &Registry, events: &EventBus, id: &JobId) -> JobResult<()> {
    let job = registry.get(id).await?;
    let mut job = job.lock().await;

    if job.status().is_terminal() {
        debug!(job = %id, status = %job.status(), "kill on terminal job");
        return Ok(());
    }
    if job.has_exited() {
        debug!(job = %id, "kill after process exit");
        return Ok(());
    }

    match job.mark_killed() {
        Some(handle) => {
            if !handle.request_stop(StopRequest::Graceful) {
                debug!(job = %id, "process already gone");
            }
        }
        None => debug!(job = %id, "no process to signal"),
    }

    info!(job = %id, "job killed");
    events.emit(Event::JobKilled { id: id.clone() });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::job::{JobStatus, ProcessHandle, ShellHint};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn kill_sends_graceful_stop_once() {
        let registry = Registry::new();
        let events = EventBus::default();
        let (id, job) = registry.create("sleep 60", ShellHint::Default).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        job.lock().await.attach_process(ProcessHandle::new(Some(1), tx));

        kill(&registry, &events, &id).await.unwrap();
        kill(&registry, &events, &id).await.unwrap();

        assert_eq!(rx.recv().await, Some(StopRequest::Graceful));
        // handle was released on the first kill; channel is closed now
        assert_eq!(rx.recv().await, None);
        assert_eq!(job.lock().await.status(), JobStatus::Killed);
    }

    #[tokio::test]
    async fn kill_terminal_job_is_noop_success() {
        let registry = Registry::new();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let (id, job) = registry.create("true", ShellHint::Default).await;
        job.lock().await.finish(0);

        kill(&registry, &events, &id).await.unwrap();
        let job = job.lock().await;
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.exit_code(), Some(0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn kill_between_exit_and_finish_keeps_exit_code() {
        let registry = Registry::new();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let (id, job) = registry.create("true", ShellHint::Default).await;
        let (tx, _stop_rx) = mpsc::unbounded_channel();
        job.lock().await.attach_process(ProcessHandle::new(Some(1), tx));
        job.lock().await.release_process();

        kill(&registry, &events, &id).await.unwrap();
        assert!(rx.try_recv().is_err());

        let mut job = job.lock().await;
        assert!(job.finish(0));
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn kill_emits_event() {
        let registry = Registry::new();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let (id, _) = registry.create("sleep 1", ShellHint::Default).await;

        kill(&registry, &events, &id).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Event::JobKilled { id });
    }

    #[tokio::test]
    async fn kill_unknown_is_not_found() {
        let registry = Registry::new();
        let events = EventBus::default();
        let id = JobId::from("job_9_9");
        assert_eq!(
            kill(&registry, &events, &id).await.unwrap_err(),
            JobError::NotFound(id)
        );
    }
}
