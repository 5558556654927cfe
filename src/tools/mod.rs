pub mod jobs;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// How a tool call ended. An `Error` is reported back to the caller, not raised.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Outcome {
    Success(String),
    Error(String),
}

/// A tool call's outcome tagged with the tool name.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub outcome: Outcome,
}

/// Name and usage text of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
}

/// Something a caller can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, args: &HashMap<String, String>) -> Result<String>;
}

/// Tools by name. Lookups clone the `Arc` and release the lock before the
/// tool runs, so a slow `run_command` never blocks other calls.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().await.insert(name, tool);
    }

    pub async fn execute(&self, tool_name: &str, args: &HashMap<String, String>) -> ToolResult {
        let tool = self.tools.read().await.get(tool_name).cloned();
        match tool {
            Some(tool) => match tool.execute(args).await {
                Ok(output) => ToolResult {
                    tool: tool_name.to_string(),
                    outcome: Outcome::Success(output),
                },
                Err(e) => ToolResult {
                    tool: tool_name.to_string(),
                    outcome: Outcome::Error(e.to_string()),
                },
            },
            None => ToolResult {
                tool: tool_name.to_string(),
                outcome: Outcome::Error(format!("unknown tool: {}", tool_name)),
            },
        }
    }

    /// Descriptions sorted by tool name.
    pub async fn descriptions(&self) -> Vec<ToolDescription> {
        let mut descriptions: Vec<_> = self
            .tools
            .read()
            .await
            .values()
            .map(|t| ToolDescription {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect();
        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }
}
