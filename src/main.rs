use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use jobsmith::config::{ConfigOverrides, EngineConfig};
use jobsmith::engine::JobEngine;
use jobsmith::logging;
use jobsmith::tools::jobs::register_all;
use jobsmith::tools::{Outcome, ToolRegistry, ToolResult};

#[derive(Parser)]
#[command(name = "jobsmith", version, about = "Background shell jobs for agents.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON file with engine settings (stallThresholdMs, retentionMs, ...)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Idle time after which a running job is reported as stalled
    #[arg(long)]
    stall_threshold_ms: Option<u64>,

    /// How long finished jobs are kept before reaping
    #[arg(long)]
    retention_ms: Option<u64>,

    /// Reaper tick
    #[arg(long)]
    reap_interval_ms: Option<u64>,

    /// Delay between graceful and forced termination
    #[arg(long)]
    kill_grace_ms: Option<u64>,

    /// Timeout for run_command
    #[arg(long)]
    run_timeout_ms: Option<u64>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Answer JSON requests on stdin, one per line (default)
    Serve,
    /// Print the available tools
    Tools,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let file = match &self.config {
            Some(path) => ConfigOverrides::load(path)?,
            None => ConfigOverrides::default(),
        };
        let flags = ConfigOverrides {
            stall_threshold_ms: self.stall_threshold_ms,
            retention_ms: self.retention_ms,
            reap_interval_ms: self.reap_interval_ms,
            kill_grace_ms: self.kill_grace_ms,
            run_timeout_ms: self.run_timeout_ms,
        };
        Ok(EngineConfig::default().with_overrides(file.merge(flags)))
    }
}

/// One line of input: `{"tool": "poll", "args": {"id": "...", "fromLine": 3}}`.
#[derive(Debug, Deserialize)]
struct Request {
    tool: String,
    #[serde(default)]
    args: HashMap<String, serde_json::Value>,
}

impl Request {
    /// Tools take string arguments; numbers and booleans are passed as text.
    fn string_args(&self) -> HashMap<String, String> {
        self.args
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let engine = Arc::new(JobEngine::new(cli.engine_config()?));
    let tools = ToolRegistry::new();
    register_all(&tools, Arc::clone(&engine)).await;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Tools => {
            for tool in tools.descriptions().await {
                println!("{:<12} {}", tool.name, tool.description);
            }
            Ok(())
        }
        Command::Serve => serve(&engine, &tools).await,
    }
}

async fn serve(engine: &JobEngine, tools: &ToolRegistry) -> Result<()> {
    let reaper = engine.spawn_reaper();
    info!(config = ?engine.config(), "serving requests on stdin");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            result = lines.next_line() => match result? {
                Some(line) => line,
                // EOF
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                debug!(tool = %request.tool, "request");
                tools.execute(&request.tool, &request.string_args()).await
            }
            Err(e) => ToolResult {
                tool: String::new(),
                outcome: Outcome::Error(format!("invalid request: {e}")),
            },
        };

        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", serde_json::to_string(&result)?)?;
        stdout.flush()?;
    }

    reaper.abort();
    info!("shutting down");
    engine.shutdown().await;
    Ok(())
}
