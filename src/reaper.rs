//! Reaper: bounds memory by evicting old terminal jobs.
//!
//! Age is measured from job start. Running jobs are never touched, however
//! old they are.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::events::{Event, EventBus};
use crate::job::JobId;
use crate::registry::Registry;

/// Remove every terminal job started more than `retention` before `now`.
pub async fn sweep(
    registry: &Registry,
    events: &EventBus,
    retention: Duration,
    now: Instant,
) -> Vec<JobId> {
    let reaped = registry
        .remove_where(|job| {
            job.status().is_terminal() && now.saturating_duration_since(job.started_at) > retention
        })
        .await;

    for id in &reaped {
        events.emit(Event::JobReaped { id: id.clone() });
    }
    if !reaped.is_empty() {
        info!(count = reaped.len(), "reaped terminal jobs");
    }
    reaped
}

/// Run [`sweep`] every `interval` until the returned task is aborted.
pub fn spawn(
    registry: Arc<Registry>,
    events: Arc<EventBus>,
    interval: Duration,
    retention: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; nothing can be old yet
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("reaper tick");
            sweep(&registry, &events, retention, Instant::now()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, ShellHint};
    use tokio::sync::Mutex;

    const RETENTION: Duration = Duration::from_secs(300);

    async fn add(registry: &Registry, started: Instant, finish: bool) -> JobId {
        let mut job = Job::started_at(JobId::generate(), "test", ShellHint::Default, started);
        if finish {
            job.finish(0);
        }
        registry.insert(Arc::new(Mutex::new(job))).await
    }

    #[tokio::test]
    async fn removes_only_old_terminal_jobs() {
        let registry = Registry::new();
        let events = EventBus::default();
        let now = Instant::now() + Duration::from_secs(1_000);

        let old_done = add(&registry, now - Duration::from_secs(301), true).await;
        let young_done = add(&registry, now - Duration::from_secs(299), true).await;
        let old_running = add(&registry, now - Duration::from_secs(10_000), false).await;

        let reaped = sweep(&registry, &events, RETENTION, now).await;
        assert_eq!(reaped, vec![old_done.clone()]);

        let listed: Vec<_> = registry.list().await.into_iter().map(|s| s.id).collect();
        assert!(!listed.contains(&old_done));
        assert!(listed.contains(&young_done));
        assert!(listed.contains(&old_running));
    }

    #[tokio::test]
    async fn emits_reaped_events() {
        let registry = Registry::new();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let now = Instant::now() + Duration::from_secs(1_000);
        let id = add(&registry, now - Duration::from_secs(400), true).await;

        sweep(&registry, &events, RETENTION, now).await;
        assert_eq!(rx.recv().await.unwrap(), Event::JobReaped { id });
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_sweeps_on_interval() {
        let registry = Arc::new(Registry::new());
        let events = Arc::new(EventBus::default());
        let id = add(&registry, Instant::now(), true).await;

        let task = spawn(
            Arc::clone(&registry),
            Arc::clone(&events),
            Duration::from_secs(60),
            Duration::from_secs(90),
        );

        // first sweep at 60s: job is 60s old, kept
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.get(&id).await.is_ok());

        // second sweep at 120s: job is 120s old, gone
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(registry.get(&id).await.is_err());

        task.abort();
    }
}
