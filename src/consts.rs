//! Project-wide constants.

use std::time::Duration;

/// A running job idle for longer than this is reported as stalled.
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_millis(30_000);

/// Terminal jobs older than this are evicted by the reaper.
pub const DEFAULT_RETENTION: Duration = Duration::from_millis(300_000);

/// How often the reaper sweeps the registry.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(60_000);

/// Delay between the graceful stop signal and the forced kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(1_000);

/// Upper bound for the synchronous `run_command` path.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// Commands in `list` output are cut to this many characters.
pub const COMMAND_PREVIEW_CHARS: usize = 100;

/// Read buffer size for process output streams.
pub const READ_CHUNK_BYTES: usize = 8192;

/// After a process exits, how long to wait for its pipes to drain before
/// recording the exit. Grandchildren holding a pipe open must not block it.
pub const STREAM_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Extra wait on shutdown after the kill grace, for the forced kills to land.
pub const SHUTDOWN_MARGIN: Duration = Duration::from_millis(100);
