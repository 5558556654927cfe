//! Process runner: launches a job's process and feeds its output into the
//! job record.
//!
//! Each job gets three tasks. Two pumps copy stdout and stderr chunks into
//! the record as they arrive. A supervisor owns the [`Child`], waits for it to
//! exit and carries out stop requests, so a signal is never sent to a process
//! that has already been reaped.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::consts::{READ_CHUNK_BYTES, STREAM_DRAIN_TIMEOUT};
use crate::events::{Event, EventBus};
use crate::job::{JobId, JobStatus, ProcessHandle, ShellHint, StopRequest};
use crate::registry::{Registry, SharedJob};
use crate::shell::{ShellResolver, build_command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Result of the blocking `run_command` path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

pub struct Runner {
    resolver: Arc<dyn ShellResolver>,
    events: Arc<EventBus>,
    kill_grace: Duration,
}

impl Runner {
    pub fn new(resolver: Arc<dyn ShellResolver>, events: Arc<EventBus>, kill_grace: Duration) -> Self {
        Self {
            resolver,
            events,
            kill_grace,
        }
    }

    fn command(&self, command: &str, shell: ShellHint) -> Command {
        let mut cmd = build_command(command, shell, self.resolver.as_ref());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so stop signals reach whatever the shell started.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Register a job and launch its process. Returns as soon as the launch
    /// has been attempted; a launch failure is recorded on the job.
    pub async fn start(&self, registry: &Registry, command: &str, shell: ShellHint) -> JobId {
        let (id, job) = registry.create(command, shell).await;
        self.events.emit(Event::JobStarted {
            id: id.clone(),
            command: command.to_string(),
        });

        let mut child = match self.command(command, shell).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(job = %id, error = %e, "failed to start process");
                if job.lock().await.fail(&format!("failed to start process: {e}")) {
                    self.events.emit(Event::JobFinished {
                        id: id.clone(),
                        status: JobStatus::Error,
                        exit_code: None,
                    });
                }
                return id;
            }
        };

        let pid = child.id();
        info!(job = %id, pid = ?pid, %command, "job started");

        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let handle = ProcessHandle::new(pid, stop_tx);
        if !job.lock().await.attach_process(handle.clone()) {
            // Killed while the process was being launched.
            handle.request_stop(StopRequest::Graceful);
        }

        let pumps = [
            child
                .stdout
                .take()
                .map(|out| tokio::spawn(pump(Arc::clone(&job), out, Stream::Stdout))),
            child
                .stderr
                .take()
                .map(|err| tokio::spawn(pump(Arc::clone(&job), err, Stream::Stderr))),
        ];

        tokio::spawn(supervise(
            job,
            child,
            stop_rx,
            pumps.into_iter().flatten().collect(),
            self.kill_grace,
            Arc::clone(&self.events),
        ));

        id
    }

    /// Run a command to completion, bounded by `timeout`. No job record is
    /// created; on timeout the process group is killed.
    pub async fn run_to_completion(
        &self,
        command: &str,
        shell: ShellHint,
        timeout: Duration,
    ) -> RunOutput {
        let mut cmd = self.command(command, shell);
        cmd.kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, %command, "failed to start process");
                return RunOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to start process: {e}\n"),
                    timed_out: false,
                };
            }
        };
        let pid = child.id();

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => RunOutput {
                exit_code: Some(exit_code(output.status)),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            },
            Ok(Err(e)) => RunOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: format!("failed to wait for process: {e}\n"),
                timed_out: false,
            },
            Err(_) => {
                warn!(%command, timeout_ms = timeout.as_millis() as u64, "command timed out");
                // The direct child died with the dropped future; finish off the group.
                signal_group(pid, StopRequest::Force);
                RunOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("timed out after {} ms\n", timeout.as_millis()),
                    timed_out: true,
                }
            }
        }
    }
}

/// Copy one output stream into the job until EOF.
async fn pump<R>(job: SharedJob, mut reader: R, stream: Stream)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let mut job = job.lock().await;
                match stream {
                    Stream::Stdout => job.append_stdout(&buf[..n], Instant::now()),
                    Stream::Stderr => job.append_stderr(&buf[..n], Instant::now()),
                }
            }
            Err(e) => {
                let mut job = job.lock().await;
                warn!(job = %job.id, stream = stream.name(), error = %e, "output stream failed");
                // The job is abandoned; make sure its process does not outlive it.
                let handle = job.process().cloned();
                if job.fail(&format!("{} read failed: {e}", stream.name())) {
                    if let Some(handle) = handle {
                        handle.request_stop(StopRequest::Force);
                    }
                }
                break;
            }
        }
    }
}

enum Wake {
    Exited(std::io::Result<ExitStatus>),
    Stop(StopRequest),
    GraceElapsed,
}

/// Own the child until it exits, escalating a graceful stop to a forced one
/// once `grace` has passed.
async fn supervise(
    job: SharedJob,
    mut child: Child,
    mut stop_rx: mpsc::UnboundedReceiver<StopRequest>,
    pumps: Vec<JoinHandle<()>>,
    grace: Duration,
    events: Arc<EventBus>,
) {
    let pid = child.id();
    let mut force_at: Option<Instant> = None;

    let exit = loop {
        let wake = tokio::select! {
            status = child.wait() => Wake::Exited(status),
            Some(request) = stop_rx.recv() => Wake::Stop(request),
            _ = tokio::time::sleep_until(force_at.unwrap_or_else(Instant::now)), if force_at.is_some() => {
                Wake::GraceElapsed
            }
        };

        match wake {
            Wake::Exited(status) => break status,
            Wake::Stop(StopRequest::Graceful) => {
                debug!(pid = ?pid, "sending graceful stop");
                signal_group(pid, StopRequest::Graceful);
                #[cfg(not(unix))]
                if let Err(e) = child.start_kill() {
                    debug!(pid = ?pid, error = %e, "start_kill failed");
                }
                if force_at.is_none() {
                    force_at = Some(Instant::now() + grace);
                }
            }
            Wake::Stop(StopRequest::Force) | Wake::GraceElapsed => {
                info!(pid = ?pid, "forcing process termination");
                signal_group(pid, StopRequest::Force);
                if let Err(e) = child.start_kill() {
                    debug!(pid = ?pid, error = %e, "start_kill failed");
                }
                force_at = None;
            }
        }
    };

    // The leader is reaped. From here on a kill must not overwrite the exit.
    job.lock().await.release_process();

    // SIGTERM may have taken down only the leader. Group members that ignore
    // it still get SIGKILL once the grace period ends.
    if let Some(at) = force_at {
        tokio::time::sleep_until(at).await;
        info!(pid = ?pid, "forcing termination of remaining group members");
        signal_group(pid, StopRequest::Force);
    }

    // Let the pipes drain so the final output is in place before the exit is
    // recorded. A grandchild holding a pipe open must not hold up the job.
    let drained = tokio::time::timeout(STREAM_DRAIN_TIMEOUT, futures::future::join_all(pumps)).await;
    if drained.is_err() {
        debug!(pid = ?pid, "output still open after exit");
    }

    let mut job = job.lock().await;
    let recorded = match exit {
        Ok(status) => {
            let code = exit_code(status);
            let recorded = job.finish(code);
            if recorded {
                info!(job = %job.id, exit_code = code, "job finished");
            }
            recorded
        }
        Err(e) => {
            warn!(job = %job.id, error = %e, "failed to wait for process");
            job.fail(&format!("failed to wait for process: {e}"))
        }
    };

    if recorded {
        events.emit(Event::JobFinished {
            id: job.id.clone(),
            status: job.status(),
            exit_code: job.exit_code(),
        });
    } else {
        debug!(job = %job.id, status = %job.status(), "process exited after job became terminal");
    }
}

/// Exit code as reported, or `128 + signal` for a signal death.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Signal the whole process group led by `pid`.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, request: StopRequest) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let signal = match request {
        StopRequest::Graceful => Signal::SIGTERM,
        StopRequest::Force => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        debug!(pid, ?signal, error = %e, "killpg failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _request: StopRequest) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn exit_code_reports_signal_deaths() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status: low 7 bits carry the terminating signal.
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
        // Normal exit: code in the high byte.
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
    }

    #[tokio::test]
    async fn pump_appends_chunks_and_counts_lines() {
        let registry = Registry::new();
        let (_, job) = registry.create("test", ShellHint::Default).await;
        let data: &[u8] = b"one\ntwo\nthree";
        pump(Arc::clone(&job), data, Stream::Stdout).await;

        let job = job.lock().await;
        assert_eq!(job.stdout(), b"one\ntwo\nthree");
        assert_eq!(job.output_line_count(), 2);
        assert!(job.stderr().is_empty());
    }

    #[tokio::test]
    async fn pump_stderr_goes_to_stderr() {
        let registry = Registry::new();
        let (_, job) = registry.create("test", ShellHint::Default).await;
        let data: &[u8] = b"oops\n";
        pump(Arc::clone(&job), data, Stream::Stderr).await;

        let job = job.lock().await;
        assert_eq!(job.stderr(), b"oops\n");
        assert_eq!(job.output_line_count(), 0);
    }
}
