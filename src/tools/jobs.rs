//! The engine's operations exposed as tools. Each tool answers with a JSON
//! document; engine errors are rendered as `{"error": "..."}` rather than
//! failing the tool call. Only malformed arguments are tool errors.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Tool, ToolRegistry};
use crate::engine::JobEngine;
use crate::error::JobResult;
use crate::job::{JobId, ShellHint};

fn required<'a>(args: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    args.get(key)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing required arg: {key}"))
}

fn shell_hint(args: &HashMap<String, String>) -> ShellHint {
    args.get("shell")
        .map(|s| ShellHint::parse(s))
        .unwrap_or_default()
}

fn render<T: Serialize>(result: JobResult<T>) -> Result<String> {
    let value = match result {
        Ok(value) => serde_json::to_value(value)?,
        Err(e) => json!({ "error": e.to_string() }),
    };
    Ok(value.to_string())
}

/// Register every job tool against one engine.
pub async fn register_all(registry: &ToolRegistry, engine: Arc<JobEngine>) {
    registry.register(Arc::new(SubmitTool::new(Arc::clone(&engine)))).await;
    registry.register(Arc::new(PollTool::new(Arc::clone(&engine)))).await;
    registry.register(Arc::new(KillTool::new(Arc::clone(&engine)))).await;
    registry.register(Arc::new(ListTool::new(Arc::clone(&engine)))).await;
    registry.register(Arc::new(RemoveTool::new(Arc::clone(&engine)))).await;
    registry.register(Arc::new(RunCommandTool::new(engine))).await;
}

macro_rules! engine_tool {
    ($name:ident) => {
        pub struct $name {
            engine: Arc<JobEngine>,
        }

        impl $name {
            pub fn new(engine: Arc<JobEngine>) -> Self {
                Self { engine }
            }
        }
    };
}

engine_tool!(SubmitTool);
engine_tool!(PollTool);
engine_tool!(KillTool);
engine_tool!(ListTool);
engine_tool!(RemoveTool);
engine_tool!(RunCommandTool);

#[async_trait]
impl Tool for SubmitTool {
    fn name(&self) -> &str {
        "submit"
    }

    fn description(&self) -> &str {
        "Start a shell command in the background and return its job id immediately. \
         Args: {\"command\": \"<shell command>\", \"shell\": \"default|alternate\"}."
    }

    async fn execute(&self, args: &HashMap<String, String>) -> Result<String> {
        let command = required(args, "command")?;
        let result = self.engine.submit(command, shell_hint(args)).await;
        render(result.map(|id| json!({ "id": id })))
    }
}

#[async_trait]
impl Tool for PollTool {
    fn name(&self) -> &str {
        "poll"
    }

    fn description(&self) -> &str {
        "Read a job's stdout from line fromLine onward, plus status, stderr and stall info. \
         Args: {\"id\": \"<job id>\", \"fromLine\": \"<n, default 0>\"}."
    }

    async fn execute(&self, args: &HashMap<String, String>) -> Result<String> {
        let id = JobId::from(required(args, "id")?);
        let from_line = match args.get("fromLine") {
            Some(n) => n
                .trim()
                .parse::<usize>()
                .with_context(|| format!("fromLine must be a non-negative integer, got {n:?}"))?,
            None => 0,
        };
        render(self.engine.poll(&id, from_line).await)
    }
}

#[async_trait]
impl Tool for KillTool {
    fn name(&self) -> &str {
        "kill"
    }

    fn description(&self) -> &str {
        "Terminate a job: graceful stop first, forced after a short grace period. \
         Args: {\"id\": \"<job id>\"}."
    }

    async fn execute(&self, args: &HashMap<String, String>) -> Result<String> {
        let id = JobId::from(required(args, "id")?);
        let result = self.engine.kill(&id).await;
        render(result.map(|()| json!({ "success": true, "id": id })))
    }
}

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List all jobs with a command preview, status, elapsed time and line count. Args: {}."
    }

    async fn execute(&self, _args: &HashMap<String, String>) -> Result<String> {
        Ok(serde_json::to_string(&self.engine.list().await)?)
    }
}

#[async_trait]
impl Tool for RemoveTool {
    fn name(&self) -> &str {
        "remove"
    }

    fn description(&self) -> &str {
        "Forget a finished job. Fails for running jobs. Args: {\"id\": \"<job id>\"}."
    }

    async fn execute(&self, args: &HashMap<String, String>) -> Result<String> {
        let id = JobId::from(required(args, "id")?);
        let result = self.engine.remove(&id).await;
        render(result.map(|()| json!({ "success": true, "id": id })))
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a short shell command and wait for it, bounded by a timeout. \
         Args: {\"command\": \"<shell command>\", \"shell\": \"default|alternate\"}."
    }

    async fn execute(&self, args: &HashMap<String, String>) -> Result<String> {
        let command = required(args, "command")?;
        render(self.engine.run_command(command, shell_hint(args)).await)
    }
}
