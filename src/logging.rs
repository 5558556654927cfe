//! Structured logging setup.
//!
//! Logs always go to stderr: stdout belongs to the request/response stream.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Set to `1` to emit JSON log lines.
pub const LOG_JSON_ENV: &str = "JOBSMITH_LOG_JSON";

/// Install the global subscriber. `default_level` applies when `RUST_LOG` is unset.
pub fn init(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let json = std::env::var(LOG_JSON_ENV).is_ok_and(|v| v == "1");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.with_target(false).try_init()
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
