//! Poll engine: an incremental, read-only view of a job's output.
//!
//! Lines are addressed by index into the `\n`-separated segments of stdout.
//! A trailing partial line counts as a segment, so `totalLines` is always
//! the terminator count plus one and a caller can resume from the last
//! `totalLines - 1` to pick up a line that was still being written.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::job::{Job, JobId, JobStatus};
use crate::registry::millis_between;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub id: JobId,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
    pub idle_ms: u64,
    pub total_lines: usize,
    pub from_line: usize,
    pub output: String,
    pub stderr: String,
    pub is_stalled: bool,
}

/// Compute the view of `job` as of `now`, starting at line `from_line`.
pub fn snapshot(job: &Job, from_line: usize, now: Instant, stall_threshold: Duration) -> PollResult {
    let idle = now.saturating_duration_since(job.last_output_at());
    let total_lines = job.output_line_count() + 1;

    PollResult {
        id: job.id.clone(),
        status: job.status(),
        exit_code: job.exit_code(),
        elapsed_ms: millis_between(job.started_at, now),
        idle_ms: idle.as_millis() as u64,
        total_lines,
        from_line,
        output: lines_from(job.stdout(), job.newline_offsets(), from_line),
        stderr: String::from_utf8_lossy(job.stderr()).into_owned(),
        is_stalled: job.status() == JobStatus::Running && idle > stall_threshold,
    }
}

/// Segments `from_line..` joined by `\n`, without the final terminator.
fn lines_from(stdout: &[u8], newlines: &[usize], from_line: usize) -> String {
    if from_line > newlines.len() {
        return String::new();
    }
    let start = match from_line {
        0 => 0,
        n => newlines[n - 1] + 1,
    };
    let tail = &stdout[start..];
    let tail = tail.strip_suffix(b"\n").unwrap_or(tail);
    String::from_utf8_lossy(tail).into_owned()
}
