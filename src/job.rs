//! The job record: one external command invocation and its mutable state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Opaque job identifier: creation time in milliseconds plus a process-wide
/// sequence number, so ids are never reused while the process lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

impl JobId {
    /// Allocate a fresh id.
    pub fn generate() -> Self {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(format!("job_{millis}_{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which interpreter runs the command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellHint {
    /// The platform shell (`sh` on unix, `cmd` on windows).
    #[default]
    Default,
    /// An alternate interpreter found by a [`ShellResolver`](crate::shell::ShellResolver).
    Alternate,
}

impl ShellHint {
    /// Parse a hint from a tool argument. Unknown values fall back to default.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "alternate" | "alt" | "bash" => Self::Alternate,
            _ => Self::Default,
        }
    }
}

/// Job lifecycle. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
    Killed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// Stop requests delivered to the task supervising a job's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// SIGTERM now, SIGKILL after the grace period if still alive.
    Graceful,
    /// SIGKILL now.
    Force,
}

/// Control channel to a live process. The supervisor task owns the child
/// itself; dropping every handle does not stop the process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    stop_tx: mpsc::UnboundedSender<StopRequest>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>, stop_tx: mpsc::UnboundedSender<StopRequest>) -> Self {
        Self { pid, stop_tx }
    }

    /// Ask the supervisor to stop the process. Returns `false` if the
    /// supervisor has already gone away (process exited).
    pub fn request_stop(&self, request: StopRequest) -> bool {
        self.stop_tx.send(request).is_ok()
    }
}

/// State of a single job. Buffers are append-only; status only moves out of
/// `Running`, never back.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub shell: ShellHint,
    status: JobStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    /// Byte offset of every `\n` in `stdout`, in order.
    newlines: Vec<usize>,
    exit_code: Option<i32>,
    /// The process has been reaped but its exit is not recorded yet.
    exited: bool,
    pub started_at: Instant,
    last_output_at: Instant,
    process: Option<ProcessHandle>,
}

impl Job {
    pub fn new(id: JobId, command: &str, shell: ShellHint) -> Self {
        Self::started_at(id, command, shell, Instant::now())
    }

    /// Build a job with an explicit start time.
    pub fn started_at(id: JobId, command: &str, shell: ShellHint, now: Instant) -> Self {
        Self {
            id,
            command: command.to_string(),
            shell,
            status: JobStatus::Running,
            stdout: Vec::new(),
            stderr: Vec::new(),
            newlines: Vec::new(),
            exit_code: None,
            exited: false,
            started_at: now,
            last_output_at: now,
            process: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn last_output_at(&self) -> Instant {
        self.last_output_at
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Number of line terminators seen on stdout.
    pub fn output_line_count(&self) -> usize {
        self.newlines.len()
    }

    /// Offsets of the line terminators on stdout.
    pub fn newline_offsets(&self) -> &[usize] {
        &self.newlines
    }

    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    /// Attach the live process. Refused (returns `false`) once the job is
    /// terminal.
    pub fn attach_process(&mut self, handle: ProcessHandle) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.process = Some(handle);
        true
    }

    /// Drop the process handle once the process has been reaped, ahead of
    /// recording its exit. A kill arriving in between leaves the job alone.
    pub fn release_process(&mut self) {
        self.process = None;
        self.exited = true;
    }

    /// Whether the process has exited (its exit may still be pending).
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Append a stdout chunk. Only the new bytes are scanned for newlines.
    pub fn append_stdout(&mut self, chunk: &[u8], now: Instant) {
        let base = self.stdout.len();
        self.newlines.extend(
            chunk
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| base + i),
        );
        self.stdout.extend_from_slice(chunk);
        self.last_output_at = now;
    }

    pub fn append_stderr(&mut self, chunk: &[u8], now: Instant) {
        self.stderr.extend_from_slice(chunk);
        self.last_output_at = now;
    }

    /// `running -> done`. Returns `false` if the job was already terminal.
    pub fn finish(&mut self, exit_code: i32) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Done;
        self.exit_code = Some(exit_code);
        self.process = None;
        true
    }

    /// `running -> error`, appending a diagnostic line to stderr.
    pub fn fail(&mut self, diagnostic: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Error;
        if !self.stderr.is_empty() && !self.stderr.ends_with(b"\n") {
            self.stderr.push(b'\n');
        }
        self.stderr.extend_from_slice(diagnostic.as_bytes());
        self.stderr.push(b'\n');
        self.process = None;
        true
    }

    /// `running -> killed`. Hands back the process handle so the caller can
    /// signal it; `None` when there is nothing left to signal.
    pub fn mark_killed(&mut self) -> Option<ProcessHandle> {
        if self.status.is_terminal() || self.exited {
            return None;
        }
        self.status = JobStatus::Killed;
        self.process.take()
    }
}
